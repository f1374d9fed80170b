//! CLI commands for evaluating sepsis criteria on a cohort CSV.

pub mod auroc;
pub mod operating_points;
pub mod show_config;

pub use auroc::{run_auroc, AurocArgs};
pub use operating_points::{run_operating_points, OperatingPointsArgs};
pub use show_config::{run_show_config, ShowConfigArgs};

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use sepsis3_core::config_loader::DEFAULT_CONFIG_PATH;
use sepsis3_core::{AppConfig, CohortTable, ConfigLoader, FailurePolicy, OutputFormat};

/// Arguments shared by the report commands. Flags override the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file (TOML); defaults to config/Sepsis3.toml when present
    #[arg(short, long)]
    pub config: Option<String>,

    /// Cohort CSV, one row per ICU stay
    #[arg(long)]
    pub cohort: Option<String>,

    /// Reference-standard outcome column (default: angus)
    #[arg(long)]
    pub outcome: Option<String>,

    /// Output format: text, csv, json
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(long)]
    pub output: Option<String>,

    /// Seed for bootstrap resampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of bootstrap resamples
    #[arg(long)]
    pub resamples: Option<usize>,

    /// Confidence level of intervals, e.g. 0.95
    #[arg(long)]
    pub confidence_level: Option<f64>,

    /// What to do when a metric is undefined: placeholder, abort
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,
}

impl CommonArgs {
    /// Loads the configuration and applies the command-line overrides.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(cohort) = &self.cohort {
            config.cohort.path = Some(cohort.clone());
        }
        if let Some(outcome) = &self.outcome {
            config.cohort.outcome = outcome.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(seed) = self.seed {
            config.bootstrap.seed = Some(seed);
        }
        if let Some(resamples) = self.resamples {
            config.bootstrap.n_resamples = resamples;
        }
        if let Some(level) = self.confidence_level {
            config.bootstrap.confidence_level = level;
        }
        if let Some(policy) = self.failure_policy {
            config.evaluation.failure_policy = policy;
        }

        Ok(config)
    }
}

/// Loads configuration from `path`, or from the default location.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load_config(path: Option<&str>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            if !Path::new(path).exists() {
                bail!("Configuration file not found: {}", path);
            }
            ConfigLoader::load_from(path)
                .with_context(|| format!("Failed to load configuration from {path}"))
        }
        None => ConfigLoader::load()
            .with_context(|| format!("Failed to load configuration from {DEFAULT_CONFIG_PATH}")),
    }
}

/// Reads the cohort named by the configuration and warns about repeated stays.
pub fn load_cohort(config: &AppConfig) -> Result<CohortTable> {
    let path = config
        .cohort
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("No cohort given. Use --cohort or set [cohort] path"))?;
    let table = CohortTable::from_path(path)
        .with_context(|| format!("Failed to read cohort {path}"))?;

    if let Some(id_column) = config.cohort.id_column.as_deref() {
        if table.has_column(id_column) {
            let duplicates = table.duplicate_ids(id_column)?;
            if duplicates > 0 {
                tracing::warn!(
                    duplicates,
                    column = id_column,
                    "Cohort repeats patient-stay identifiers"
                );
            }
        }
    }

    Ok(table)
}

/// Keeps complete cases over `columns`, failing if nothing is left.
pub fn complete_cases(table: &CohortTable, columns: &[&str]) -> Result<CohortTable> {
    let complete = table.complete_cases(columns)?;
    if complete.is_empty() {
        bail!(
            "No complete rows in cohort for columns: {}",
            columns.join(", ")
        );
    }
    Ok(complete)
}

/// Prints `content` or writes it to `path`.
pub fn write_report(content: &str, path: Option<&str>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report to {path}"))?;
            tracing::info!("Report written to {}", path);
        }
        None => println!("{}", content.trim_end()),
    }
    Ok(())
}

/// Renders a report in the configured format.
pub fn render<T: serde::Serialize>(
    format: OutputFormat,
    report: &T,
    text: impl FnOnce(&T) -> String,
    csv: impl FnOnce(&T) -> Result<String>,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text(report)),
        OutputFormat::Csv => csv(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}
