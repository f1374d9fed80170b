//! AUROC CLI command.
//!
//! Computes the AUROC of each continuous score (optionally adjusted for
//! baseline covariates) and the pairwise comparison matrix.

use anyhow::{anyhow, Context, Result};
use clap::Args;

use sepsis3_core::{
    AppConfig, AurocAdjustment, AurocIntervalMethod, CohortError, CohortTable, ComparisonMethod,
    ScoreConfig,
};
use sepsis3_evaluation::{AurocOptions, AurocTable, Covariate, NamedScore};

use super::{complete_cases, load_cohort, render, write_report, CommonArgs};

/// Arguments for the auroc command.
#[derive(Args, Debug, Clone)]
pub struct AurocArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Score as NAME=COLUMN or a bare column name (repeatable)
    #[arg(long = "score", value_name = "NAME=COLUMN")]
    pub scores: Vec<String>,

    /// Adjustment: none, baseline-regression, fractional-polynomial
    #[arg(long)]
    pub adjustment: Option<AurocAdjustment>,

    /// Baseline covariate column (repeatable; replaces the configured list)
    #[arg(long = "covariate", value_name = "COLUMN")]
    pub covariates: Vec<String>,

    /// Comparison test: delong, paired-bootstrap
    #[arg(long)]
    pub comparison: Option<ComparisonMethod>,

    /// AUROC interval: delong, bootstrap
    #[arg(long)]
    pub interval: Option<AurocIntervalMethod>,
}

/// Parses `NAME=COLUMN`; a bare column is its own name.
pub fn parse_score(spec: &str) -> Result<ScoreConfig> {
    let (name, column) = match spec.split_once('=') {
        Some((name, column)) => (name.trim(), column.trim()),
        None => (spec.trim(), spec.trim()),
    };
    if name.is_empty() || column.is_empty() {
        return Err(anyhow!("Invalid --score '{}'. Use NAME=COLUMN", spec));
    }
    Ok(ScoreConfig {
        name: name.to_string(),
        column: column.to_string(),
    })
}

/// Score columns from the command line, or from the configuration.
pub fn score_columns(specs: &[String], config: &AppConfig) -> Result<Vec<ScoreConfig>> {
    if specs.is_empty() {
        Ok(config.scores_or_default())
    } else {
        specs.iter().map(|s| parse_score(s)).collect()
    }
}

/// Reads a covariate as numbers, falling back to 1/0 for boolean columns.
fn covariate_values(table: &CohortTable, column: &str) -> Result<Vec<f64>> {
    match table.numeric_column(column) {
        Ok(values) => Ok(values),
        Err(CohortError::InvalidValue { .. }) => Ok(table
            .boolean_column(column)?
            .into_iter()
            .map(|b| if b { 1.0 } else { 0.0 })
            .collect()),
        Err(e) => Err(e.into()),
    }
}

/// Runs the auroc command.
pub fn run_auroc(args: AurocArgs) -> Result<()> {
    let mut config = args.common.load_config()?;
    if let Some(adjustment) = args.adjustment {
        config.evaluation.adjustment = adjustment;
    }
    if let Some(comparison) = args.comparison {
        config.evaluation.comparison = comparison;
    }
    if let Some(interval) = args.interval {
        config.evaluation.auroc_interval = interval;
    }
    if !args.covariates.is_empty() {
        config.evaluation.covariates = args.covariates.clone();
    }

    let scores = score_columns(&args.scores, &config)?;
    let outcome = config.cohort.outcome.clone();
    let covariates: Vec<String> = match config.evaluation.adjustment {
        AurocAdjustment::None => Vec::new(),
        _ => config.evaluation.covariates.clone(),
    };

    tracing::info!(
        "Computing AUROC for {} scores against '{}' (adjustment: {}, comparison: {})",
        scores.len(),
        outcome,
        config.evaluation.adjustment,
        config.evaluation.comparison
    );

    let cohort = load_cohort(&config)?;
    let mut columns = vec![outcome.as_str()];
    columns.extend(scores.iter().map(|s| s.column.as_str()));
    columns.extend(covariates.iter().map(String::as_str));
    let cohort = complete_cases(&cohort, &columns)?;

    let outcomes = cohort
        .boolean_column(&outcome)
        .with_context(|| format!("Outcome column '{outcome}'"))?;
    let named_scores = scores
        .iter()
        .map(|s| {
            let values = cohort
                .numeric_column(&s.column)
                .with_context(|| format!("Score '{}'", s.name))?;
            Ok(NamedScore::new(&s.name, values))
        })
        .collect::<Result<Vec<_>>>()?;
    let named_covariates = covariates
        .iter()
        .map(|c| {
            let values =
                covariate_values(&cohort, c).with_context(|| format!("Covariate '{c}'"))?;
            Ok(Covariate::new(c, values))
        })
        .collect::<Result<Vec<_>>>()?;

    let options = AurocOptions {
        bootstrap: config.bootstrap.clone(),
        interval: config.evaluation.auroc_interval,
        comparison: config.evaluation.comparison,
        adjustment: config.evaluation.adjustment,
        failure_policy: config.evaluation.failure_policy,
    };
    let table = AurocTable::build(&named_scores, &outcomes, &named_covariates, &options)?;

    let rendered = render(config.output.format, &table, AurocTable::to_text, |t| {
        Ok(format!("{}\n{}", t.to_csv()?, t.comparisons_to_csv()?))
    })?;
    write_report(&rendered, config.output.path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // parse_score Tests
    // ============================================

    #[test]
    fn parse_named_score() {
        let score = parse_score("qSOFA=qsofa").unwrap();
        assert_eq!(score.name, "qSOFA");
        assert_eq!(score.column, "qsofa");
    }

    #[test]
    fn bare_column_names_itself() {
        let score = parse_score("mlods").unwrap();
        assert_eq!(score.name, "mlods");
        assert_eq!(score.column, "mlods");
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert!(parse_score("=sofa").is_err());
        assert!(parse_score("SOFA=").is_err());
    }

    #[test]
    fn default_scores_come_from_configuration() {
        let scores = score_columns(&[], &AppConfig::default()).unwrap();
        let columns: Vec<&str> = scores.iter().map(|s| s.column.as_str()).collect();
        assert_eq!(columns, vec!["sirs", "qsofa", "sofa", "mlods"]);
    }

    // ============================================
    // covariate_values Tests
    // ============================================

    #[test]
    fn boolean_covariates_become_indicators() {
        let csv = "age,is_male\n70,t\n55,f\n";
        let table = CohortTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(covariate_values(&table, "age").unwrap(), vec![70.0, 55.0]);
        assert_eq!(covariate_values(&table, "is_male").unwrap(), vec![1.0, 0.0]);
    }
}
