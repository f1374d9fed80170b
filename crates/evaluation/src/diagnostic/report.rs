//! Operating-point report: one row of diagnostic accuracy statistics per
//! named binary predictor.
//!
//! Rows keep the order the predictors were supplied in, so less specific
//! criteria can be listed before the composite one. A metric that cannot be
//! computed becomes [`Metric::Undefined`] under [`FailurePolicy::Placeholder`]
//! and fails the whole report under [`FailurePolicy::Abort`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sepsis3_core::{wilson_ci, z_for_confidence, BootstrapConfig, FailurePolicy, ProportionIntervalMethod};
use tracing::{info, warn};

use super::bootstrap::{rate_statistic, BootstrapEstimator, ResamplePlan};
use super::confusion::{ConfusionMatrix, RateKind};
use super::interval::ConfidenceInterval;
use crate::error::{EvaluationError, Result};

/// A computed value, or the reason it could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric<T> {
    Value(T),
    Undefined { reason: String },
}

impl<T> Metric<T> {
    /// An undefined cell with the given reason.
    #[must_use]
    pub fn undefined(reason: &str) -> Self {
        Self::Undefined {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Undefined { .. } => None,
        }
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

/// Applies `policy` to one computed cell.
///
/// # Errors
/// Returns the cell's error under [`FailurePolicy::Abort`].
pub(crate) fn resolve<T>(
    policy: FailurePolicy,
    row: &str,
    metric: &str,
    result: Result<T>,
) -> Result<Metric<T>> {
    match result {
        Ok(value) => Ok(Metric::Value(value)),
        Err(e) => match policy {
            FailurePolicy::Abort => Err(e),
            FailurePolicy::Placeholder => {
                warn!(row, metric, error = %e, "Metric undefined, using placeholder");
                Ok(Metric::undefined(&e.to_string()))
            }
        },
    }
}

/// Binary predictions of one named criterion, aligned with the outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPredictor {
    pub name: String,
    pub predictions: Vec<bool>,
}

impl NamedPredictor {
    #[must_use]
    pub fn new(name: &str, predictions: Vec<bool>) -> Self {
        Self {
            name: name.to_string(),
            predictions,
        }
    }
}

/// How intervals are computed and failures handled.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub bootstrap: BootstrapConfig,
    pub interval: ProportionIntervalMethod,
    pub failure_policy: FailurePolicy,
}

impl ReportOptions {
    #[must_use]
    pub fn new(
        bootstrap: BootstrapConfig,
        interval: ProportionIntervalMethod,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            bootstrap,
            interval,
            failure_policy,
        }
    }
}

/// Statistics of one predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingPointRow {
    pub name: String,
    pub counts: Metric<ConfusionMatrix>,
    pub sensitivity: Metric<ConfidenceInterval>,
    pub specificity: Metric<ConfidenceInterval>,
    pub ppv: Metric<ConfidenceInterval>,
    pub npv: Metric<ConfidenceInterval>,
    pub f1: Metric<f64>,
    pub ntp_per_100: Metric<f64>,
    pub nfp_per_100: Metric<f64>,
}

impl OperatingPointRow {
    fn undefined(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: Metric::undefined(reason),
            sensitivity: Metric::undefined(reason),
            specificity: Metric::undefined(reason),
            ppv: Metric::undefined(reason),
            npv: Metric::undefined(reason),
            f1: Metric::undefined(reason),
            ntp_per_100: Metric::undefined(reason),
            nfp_per_100: Metric::undefined(reason),
        }
    }

    /// Interval of one of the four rates.
    #[must_use]
    pub fn rate(&self, kind: RateKind) -> &Metric<ConfidenceInterval> {
        match kind {
            RateKind::Sensitivity => &self.sensitivity,
            RateKind::Specificity => &self.specificity,
            RateKind::Ppv => &self.ppv,
            RateKind::Npv => &self.npv,
        }
    }
}

/// Operating-point statistics for several predictors against one outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingPointReport {
    pub generated_at: DateTime<Utc>,
    pub confidence_level: f64,
    pub interval_method: ProportionIntervalMethod,
    pub n_stays: usize,
    pub rows: Vec<OperatingPointRow>,
}

impl OperatingPointReport {
    /// Builds one row per predictor, in the order given.
    ///
    /// Bootstrap intervals draw every row's resample plan from one
    /// generator, so a seeded run is reproducible as a whole.
    ///
    /// # Errors
    /// `EmptyInput` without outcomes, `InvalidParameter` for a bad bootstrap
    /// configuration, or, under [`FailurePolicy::Abort`], the first metric
    /// that cannot be computed.
    pub fn build(
        predictors: &[NamedPredictor],
        outcomes: &[bool],
        options: &ReportOptions,
    ) -> Result<Self> {
        if outcomes.is_empty() {
            return Err(EvaluationError::EmptyInput);
        }
        let estimator = BootstrapEstimator::new(options.bootstrap.clone());
        estimator.validate()?;
        let mut rng = estimator.rng();
        let policy = options.failure_policy;
        let z = z_for_confidence(options.bootstrap.confidence_level);

        let mut rows = Vec::with_capacity(predictors.len());
        for predictor in predictors {
            let name = predictor.name.as_str();
            let cm = match resolve(
                policy,
                name,
                "counts",
                ConfusionMatrix::compute(&predictor.predictions, outcomes),
            )? {
                Metric::Value(cm) => cm,
                Metric::Undefined { reason } => {
                    rows.push(OperatingPointRow::undefined(name, &reason));
                    continue;
                }
            };

            let plan = match options.interval {
                ProportionIntervalMethod::Bootstrap => Some(ResamplePlan::from_rng(
                    outcomes.len(),
                    options.bootstrap.n_resamples,
                    &mut rng,
                )),
                ProportionIntervalMethod::Wilson => None,
            };
            let interval = |kind: RateKind| -> Result<ConfidenceInterval> {
                match &plan {
                    Some(plan) => estimator
                        .estimate_with_plan(
                            plan,
                            rate_statistic(kind),
                            &predictor.predictions,
                            outcomes,
                        )
                        .map(|r| r.interval),
                    None => wilson_interval(&cm, kind, z),
                }
            };

            let row = OperatingPointRow {
                name: name.to_string(),
                counts: Metric::Value(cm),
                sensitivity: resolve(policy, name, "sensitivity", interval(RateKind::Sensitivity))?,
                specificity: resolve(policy, name, "specificity", interval(RateKind::Specificity))?,
                ppv: resolve(policy, name, "ppv", interval(RateKind::Ppv))?,
                npv: resolve(policy, name, "npv", interval(RateKind::Npv))?,
                f1: resolve(policy, name, "f1", cm.f1())?,
                ntp_per_100: resolve(policy, name, "ntp_per_100", cm.ntp_per_100())?,
                nfp_per_100: resolve(policy, name, "nfp_per_100", cm.nfp_per_100())?,
            };
            rows.push(row);
        }

        info!(
            predictors = rows.len(),
            stays = outcomes.len(),
            method = %options.interval,
            "Built operating-point report"
        );

        Ok(Self {
            generated_at: Utc::now(),
            confidence_level: options.bootstrap.confidence_level,
            interval_method: options.interval,
            n_stays: outcomes.len(),
            rows,
        })
    }

    /// Fixed-width console table.
    #[must_use]
    pub fn to_text(&self) -> String {
        let ci_label = format!("{:.0}% CI", self.confidence_level * 100.0);
        let name_width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("Predictor".len());
        let mut output = String::new();

        output.push_str("===============================================================\n");
        output.push_str("                    OPERATING POINT REPORT                     \n");
        output.push_str("===============================================================\n");
        output.push_str(&format!("Stays: {}\n", self.n_stays));
        output.push_str(&format!(
            "Intervals: {} ({})\n",
            ci_label, self.interval_method
        ));
        output.push_str(&format!(
            "Generated: {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        output.push_str(&format!(
            "{:<name_width$} {:>6} {:>6} {:>6} {:>6}",
            "Predictor", "TP", "FP", "TN", "FN"
        ));
        for kind in RateKind::ALL {
            output.push_str(&format!(" {:>20}", kind.label()));
        }
        output.push_str(&format!(" {:>6} {:>8} {:>8}\n", "F1", "NTP/100", "NFP/100"));

        for row in &self.rows {
            output.push_str(&format!("{:<name_width$}", row.name));
            match row.counts.value() {
                Some(cm) => output.push_str(&format!(
                    " {:>6} {:>6} {:>6} {:>6}",
                    cm.true_positives, cm.false_positives, cm.true_negatives, cm.false_negatives
                )),
                None => output.push_str(&format!(" {:>27}", "undefined")),
            }
            for kind in RateKind::ALL {
                output.push_str(&format!(" {:>20}", format_interval(row.rate(kind))));
            }
            output.push_str(&format!(
                " {:>6} {:>8} {:>8}\n",
                format_scalar(&row.f1, 2),
                format_scalar(&row.ntp_per_100, 1),
                format_scalar(&row.nfp_per_100, 1)
            ));
        }

        output.push_str("===============================================================\n");
        output
    }

    /// Delimited report, one line per predictor. Undefined cells are empty.
    ///
    /// # Errors
    /// Returns an error if the CSV writer fails.
    pub fn to_csv(&self) -> std::result::Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![
            "predictor".to_string(),
            "tp".to_string(),
            "fp".to_string(),
            "tn".to_string(),
            "fn".to_string(),
        ];
        for kind in RateKind::ALL {
            let label = kind.label().to_lowercase();
            header.push(label.clone());
            header.push(format!("{label}_lower"));
            header.push(format!("{label}_upper"));
        }
        header.extend(["f1", "ntp_per_100", "nfp_per_100"].map(str::to_string));
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.name.clone()];
            match row.counts.value() {
                Some(cm) => record.extend(
                    [
                        cm.true_positives,
                        cm.false_positives,
                        cm.true_negatives,
                        cm.false_negatives,
                    ]
                    .map(|c| c.to_string()),
                ),
                None => record.extend(std::iter::repeat(String::new()).take(4)),
            }
            for kind in RateKind::ALL {
                match row.rate(kind).value() {
                    Some(ci) => record.extend(
                        [ci.point_estimate, ci.lower, ci.upper].map(|v| format!("{v:.6}")),
                    ),
                    None => record.extend(std::iter::repeat(String::new()).take(3)),
                }
            }
            for metric in [&row.f1, &row.ntp_per_100, &row.nfp_per_100] {
                record.push(metric.value().map_or_else(String::new, |v| format!("{v:.6}")));
            }
            writer.write_record(&record)?;
        }

        csv_string(writer)
    }
}

/// Wilson score interval of one rate.
fn wilson_interval(cm: &ConfusionMatrix, kind: RateKind, z: f64) -> Result<ConfidenceInterval> {
    let point = cm.rate(kind)?;
    let (successes, trials) = kind.counts(cm);
    let (lower, upper) = wilson_ci(successes, trials, z);
    Ok(ConfidenceInterval::new(point, lower, upper))
}

pub(crate) fn format_interval(metric: &Metric<ConfidenceInterval>) -> String {
    match metric.value() {
        Some(ci) => format!(
            "{:.2} [{:.2}, {:.2}]",
            ci.point_estimate, ci.lower, ci.upper
        ),
        None => "undefined".to_string(),
    }
}

pub(crate) fn format_scalar(metric: &Metric<f64>, decimals: usize) -> String {
    match metric.value() {
        Some(v) => format!("{v:.decimals$}"),
        None => "undefined".to_string(),
    }
}

pub(crate) fn csv_string(writer: csv::Writer<Vec<u8>>) -> std::result::Result<String, csv::Error> {
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn outcomes() -> Vec<bool> {
        (0..100).map(|i| i < 40).collect()
    }

    /// Flags the first `hits` positives and the first `false_alarms` negatives.
    fn predictor(name: &str, hits: usize, false_alarms: usize) -> NamedPredictor {
        let predictions = (0..100)
            .map(|i| if i < 40 { i < hits } else { i - 40 < false_alarms })
            .collect();
        NamedPredictor::new(name, predictions)
    }

    fn options(interval: ProportionIntervalMethod, policy: FailurePolicy) -> ReportOptions {
        ReportOptions::new(
            BootstrapConfig::new(200, 0.95).with_seed(42),
            interval,
            policy,
        )
    }

    // ============================================================
    // build
    // ============================================================

    #[test]
    fn rows_follow_insertion_order() {
        let predictors = [
            predictor("SIRS", 36, 45),
            predictor("qSOFA", 20, 10),
            predictor("Sepsis-3", 30, 20),
        ];
        let report = OperatingPointReport::build(
            &predictors,
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Abort),
        )
        .unwrap();

        let names: Vec<&str> = report.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SIRS", "qSOFA", "Sepsis-3"]);
        assert_eq!(report.n_stays, 100);
    }

    #[test]
    fn row_carries_counts_and_rates() {
        let report = OperatingPointReport::build(
            &[predictor("SOFA", 30, 15)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Abort),
        )
        .unwrap();
        let row = &report.rows[0];

        assert_eq!(
            row.counts.value(),
            Some(&ConfusionMatrix::from_counts(30, 15, 45, 10))
        );
        let sens = row.sensitivity.value().unwrap();
        assert!((sens.point_estimate - 0.75).abs() < 1e-12);
        assert!(sens.lower < 0.75 && sens.upper > 0.75);
        let spec = row.specificity.value().unwrap();
        assert!((spec.point_estimate - 0.75).abs() < 1e-12);
        assert!((row.ntp_per_100.value().unwrap() - 75.0).abs() < 1e-9);
        assert!((row.nfp_per_100.value().unwrap() - 37.5).abs() < 1e-9);
    }

    #[test]
    fn bootstrap_report_is_reproducible() {
        let predictors = [predictor("SIRS", 36, 45), predictor("qSOFA", 20, 10)];
        let opts = options(ProportionIntervalMethod::Bootstrap, FailurePolicy::Abort);

        let first = OperatingPointReport::build(&predictors, &outcomes(), &opts).unwrap();
        let second = OperatingPointReport::build(&predictors, &outcomes(), &opts).unwrap();

        assert_eq!(first.rows, second.rows);
        for row in &first.rows {
            for kind in RateKind::ALL {
                let ci = row.rate(kind).value().unwrap();
                assert!(ci.lower <= ci.point_estimate && ci.point_estimate <= ci.upper);
            }
        }
    }

    #[test]
    fn placeholder_marks_undefined_cells() {
        // Never fires: PPV has no denominator
        let report = OperatingPointReport::build(
            &[predictor("never", 0, 0)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Placeholder),
        )
        .unwrap();
        let row = &report.rows[0];

        assert!(row.sensitivity.is_defined());
        assert!(matches!(row.ppv, Metric::Undefined { .. }));
        assert!(matches!(row.f1, Metric::Undefined { .. }));
        assert!(report.to_text().contains("undefined"));
    }

    #[test]
    fn abort_fails_on_first_undefined_metric() {
        let err = OperatingPointReport::build(
            &[predictor("SIRS", 36, 45), predictor("never", 0, 0)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Abort),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::DegenerateInput(_)));
    }

    #[test]
    fn misaligned_predictor_becomes_placeholder_row() {
        let short = NamedPredictor::new("short", vec![true; 10]);
        let report = OperatingPointReport::build(
            &[short, predictor("SOFA", 30, 15)],
            &outcomes(),
            &options(ProportionIntervalMethod::Bootstrap, FailurePolicy::Placeholder),
        )
        .unwrap();

        assert!(!report.rows[0].counts.is_defined());
        assert!(report.rows[1].counts.is_defined());
    }

    #[test]
    fn undefined_row_marks_every_cell() {
        let row = OperatingPointRow::undefined("short", "lengths differ");

        assert_eq!(row.counts, Metric::undefined("lengths differ"));
        for kind in RateKind::ALL {
            assert!(!row.rate(kind).is_defined());
        }
        assert_eq!(row.f1, Metric::undefined("lengths differ"));
        assert!(!row.ntp_per_100.is_defined());
        assert!(!row.nfp_per_100.is_defined());
    }

    #[test]
    fn empty_outcomes_are_rejected() {
        let err = OperatingPointReport::build(&[], &[], &ReportOptions::default()).unwrap_err();
        assert_eq!(err, EvaluationError::EmptyInput);
    }

    // ============================================================
    // Rendering
    // ============================================================

    #[test]
    fn text_lists_every_predictor() {
        let report = OperatingPointReport::build(
            &[predictor("SIRS", 36, 45), predictor("qSOFA", 20, 10)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Abort),
        )
        .unwrap();
        let text = report.to_text();

        assert!(text.contains("OPERATING POINT REPORT"));
        assert!(text.contains("95% CI"));
        let sirs = text.find("SIRS").unwrap();
        let qsofa = text.find("qSOFA").unwrap();
        assert!(sirs < qsofa);
        assert!(text.contains("0.90 ["));
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let report = OperatingPointReport::build(
            &[predictor("SOFA", 30, 15), predictor("never", 0, 0)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Placeholder),
        )
        .unwrap();
        let csv = report.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("predictor,tp,fp,tn,fn,sens,sens_lower,sens_upper"));
        assert!(lines[1].starts_with("SOFA,30,15,45,10,0.750000,"));
        // PPV of the silent predictor is blank
        let fields: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(fields[11], "");
    }

    #[test]
    fn json_round_trips_metric_tags() {
        let report = OperatingPointReport::build(
            &[predictor("never", 0, 0)],
            &outcomes(),
            &options(ProportionIntervalMethod::Wilson, FailurePolicy::Placeholder),
        )
        .unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"undefined\""));
        let parsed: OperatingPointReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rows, report.rows);
    }
}
