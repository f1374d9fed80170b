//! Operating-point report CLI command.
//!
//! Applies threshold rules (`sofa >= 2`, `sepsis3`) to the cohort and
//! reports sensitivity, specificity, PPV and NPV with intervals, plus F1 and
//! NTP/NFP per 100, against the reference outcome.

use anyhow::{Context, Result};
use clap::Args;

use sepsis3_core::{AppConfig, PredictorRule, ProportionIntervalMethod};
use sepsis3_evaluation::{NamedPredictor, OperatingPointReport, ReportOptions};

use super::{complete_cases, load_cohort, render, write_report, CommonArgs};

/// Arguments for the operating-points command.
#[derive(Args, Debug, Clone)]
pub struct OperatingPointsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Predictor as NAME=RULE, e.g. "SOFA=sofa>=2" or "Sepsis-3=sepsis3" (repeatable)
    #[arg(long = "predictor", value_name = "NAME=RULE")]
    pub predictors: Vec<String>,

    /// Proportion interval: bootstrap, wilson
    #[arg(long)]
    pub interval: Option<ProportionIntervalMethod>,
}

/// Predictor rules from the command line, or from the configuration when
/// none are given.
pub fn predictor_rules(specs: &[String], config: &AppConfig) -> Result<Vec<PredictorRule>> {
    if specs.is_empty() {
        config
            .predictors_or_default()
            .iter()
            .map(|p| {
                PredictorRule::parse(&p.name, &p.rule)
                    .with_context(|| format!("Invalid rule for predictor '{}'", p.name))
            })
            .collect()
    } else {
        specs
            .iter()
            .map(|spec| {
                PredictorRule::parse_named(spec)
                    .with_context(|| format!("Invalid --predictor '{spec}'"))
            })
            .collect()
    }
}

/// Runs the operating-points command.
pub fn run_operating_points(args: OperatingPointsArgs) -> Result<()> {
    let mut config = args.common.load_config()?;
    if let Some(interval) = args.interval {
        config.evaluation.proportion_interval = interval;
    }

    let rules = predictor_rules(&args.predictors, &config)?;
    let outcome = config.cohort.outcome.clone();

    tracing::info!(
        "Evaluating {} predictors against '{}'",
        rules.len(),
        outcome
    );
    for rule in &rules {
        tracing::info!("  {}: {}", rule.name, rule);
    }

    let cohort = load_cohort(&config)?;
    let mut columns = vec![outcome.as_str()];
    columns.extend(rules.iter().map(|r| r.column.as_str()));
    let cohort = complete_cases(&cohort, &columns)?;

    let outcomes = cohort
        .boolean_column(&outcome)
        .with_context(|| format!("Outcome column '{outcome}'"))?;
    let predictors = rules
        .iter()
        .map(|rule| {
            let predictions = rule
                .apply(&cohort)
                .with_context(|| format!("Predictor '{}'", rule.name))?;
            Ok(NamedPredictor::new(&rule.name, predictions))
        })
        .collect::<Result<Vec<_>>>()?;

    let options = ReportOptions::new(
        config.bootstrap.clone(),
        config.evaluation.proportion_interval,
        config.evaluation.failure_policy,
    );
    let report = OperatingPointReport::build(&predictors, &outcomes, &options)?;

    let rendered = render(
        config.output.format,
        &report,
        OperatingPointReport::to_text,
        |r| Ok(r.to_csv()?),
    )?;
    write_report(&rendered, config.output.path.as_deref())
}
