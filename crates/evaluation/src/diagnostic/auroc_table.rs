//! AUROC table and pairwise comparison matrix for several scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sepsis3_core::{
    AurocAdjustment, AurocIntervalMethod, BootstrapConfig, ComparisonMethod, FailurePolicy,
};
use tracing::info;

use super::adjustment::{BaselineAdjuster, Covariate};
use super::auroc::{AurocComparator, AurocResult};
use super::report::{csv_string, resolve, Metric};
use crate::error::{EvaluationError, Result};

/// Continuous score of one named criterion, aligned with the outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedScore {
    pub name: String,
    pub values: Vec<f64>,
}

impl NamedScore {
    #[must_use]
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

/// How AUROCs are adjusted, bounded and compared.
#[derive(Debug, Clone, Default)]
pub struct AurocOptions {
    pub bootstrap: BootstrapConfig,
    pub interval: AurocIntervalMethod,
    pub comparison: ComparisonMethod,
    pub adjustment: AurocAdjustment,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AurocRow {
    pub name: String,
    pub result: Metric<AurocResult>,
}

/// Pairwise p-values. Only the upper triangle (`row < column`) is filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    pub names: Vec<String>,
    pub method: ComparisonMethod,
    cells: Vec<Vec<Option<Metric<f64>>>>,
}

impl ComparisonMatrix {
    fn empty(names: Vec<String>, method: ComparisonMethod) -> Self {
        let k = names.len();
        Self {
            names,
            method,
            cells: vec![vec![None; k]; k],
        }
    }

    /// P-value comparing scores `row` and `column`; `None` on the diagonal
    /// and below it.
    #[must_use]
    pub fn p_value(&self, row: usize, column: usize) -> Option<&Metric<f64>> {
        self.cells.get(row)?.get(column)?.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// AUROC per score plus the comparison matrix between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AurocTable {
    pub generated_at: DateTime<Utc>,
    pub confidence_level: f64,
    pub interval_method: AurocIntervalMethod,
    pub adjustment: AurocAdjustment,
    pub n_stays: usize,
    pub rows: Vec<AurocRow>,
    pub comparisons: ComparisonMatrix,
}

impl AurocTable {
    /// Computes (optionally adjusted) AUROCs for `scores` and compares every
    /// pair on the shared `outcomes`.
    ///
    /// One resample plan serves every bootstrap interval and paired test, so
    /// all scores see the same resamples.
    ///
    /// # Errors
    /// `EmptyInput` without outcomes; errors preparing the covariates for
    /// the adjustment; under [`FailurePolicy::Abort`], the first AUROC or
    /// comparison that cannot be computed.
    pub fn build(
        scores: &[NamedScore],
        outcomes: &[bool],
        covariates: &[Covariate],
        options: &AurocOptions,
    ) -> Result<Self> {
        if outcomes.is_empty() {
            return Err(EvaluationError::EmptyInput);
        }
        let policy = options.failure_policy;
        let adjuster = BaselineAdjuster::new(options.adjustment, covariates, outcomes)?;
        let comparator = AurocComparator::new(
            options.bootstrap.clone(),
            options.interval,
            options.comparison,
        );
        let plan = comparator.plan(outcomes.len());

        let mut adjusted: Vec<Metric<Vec<f64>>> = Vec::with_capacity(scores.len());
        for score in scores {
            adjusted.push(resolve(
                policy,
                &score.name,
                "adjusted score",
                adjuster.adjust(&score.values, outcomes),
            )?);
        }

        let mut rows = Vec::with_capacity(scores.len());
        for (score, values) in scores.iter().zip(&adjusted) {
            let result = match values {
                Metric::Value(values) => {
                    let result = comparator.auroc_with_plan(&plan, values, outcomes);
                    resolve(policy, &score.name, "auroc", result)?
                }
                Metric::Undefined { reason } => Metric::undefined(reason),
            };
            rows.push(AurocRow {
                name: score.name.clone(),
                result,
            });
        }

        let names: Vec<String> = scores.iter().map(|s| s.name.clone()).collect();
        let mut comparisons = ComparisonMatrix::empty(names, options.comparison);
        for i in 0..scores.len() {
            for j in (i + 1)..scores.len() {
                let label = format!("{} vs {}", scores[i].name, scores[j].name);
                let cell = match (&adjusted[i], &adjusted[j]) {
                    (Metric::Value(a), Metric::Value(b)) => resolve(
                        policy,
                        &label,
                        "p_value",
                        comparator.p_value_with_plan(&plan, a, b, outcomes),
                    )?,
                    (Metric::Undefined { reason }, _) | (_, Metric::Undefined { reason }) => {
                        Metric::undefined(reason)
                    }
                };
                comparisons.cells[i][j] = Some(cell);
            }
        }

        info!(
            scores = rows.len(),
            stays = outcomes.len(),
            adjustment = %options.adjustment,
            comparison = %options.comparison,
            "Built AUROC table"
        );

        Ok(Self {
            generated_at: Utc::now(),
            confidence_level: options.bootstrap.confidence_level,
            interval_method: options.interval,
            adjustment: options.adjustment,
            n_stays: outcomes.len(),
            rows,
            comparisons,
        })
    }

    /// AUROC table followed by the comparison matrix.
    #[must_use]
    pub fn to_text(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("Score".len());
        let mut output = String::new();

        output.push_str("===============================================================\n");
        output.push_str("                          AUROC                                \n");
        output.push_str("===============================================================\n");
        output.push_str(&format!("Stays: {}\n", self.n_stays));
        output.push_str(&format!("Adjustment: {}\n", self.adjustment));
        output.push_str(&format!(
            "Intervals: {:.0}% CI ({})\n",
            self.confidence_level * 100.0,
            self.interval_method
        ));
        output.push_str(&format!(
            "Generated: {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        output.push_str(&format!(
            "{:<width$} {:>22} {:>8} {:>8}\n",
            "Score", "AUROC", "N+", "N-"
        ));
        for row in &self.rows {
            match row.result.value() {
                Some(r) => output.push_str(&format!(
                    "{:<width$} {:>22} {:>8} {:>8}\n",
                    row.name,
                    format!(
                        "{:.3} [{:.3}, {:.3}]",
                        r.auroc, r.interval.lower, r.interval.upper
                    ),
                    r.n_positive,
                    r.n_negative
                )),
                None => output.push_str(&format!("{:<width$} {:>22}\n", row.name, "undefined")),
            }
        }

        output.push('\n');
        output.push_str(&format!(
            "PAIRWISE COMPARISON (p-values, {})\n",
            self.comparisons.method
        ));
        output.push_str("---------------------------------------------------------------\n");
        let cell_width = self
            .comparisons
            .names
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(9);
        output.push_str(&format!("{:<width$}", ""));
        for name in &self.comparisons.names {
            output.push_str(&format!(" {name:>cell_width$}"));
        }
        output.push('\n');
        for (i, name) in self.comparisons.names.iter().enumerate() {
            output.push_str(&format!("{name:<width$}"));
            for j in 0..self.comparisons.len() {
                let cell = match self.comparisons.p_value(i, j) {
                    Some(Metric::Value(p)) => format_p_value(*p),
                    Some(Metric::Undefined { .. }) => "undefined".to_string(),
                    None => "-".to_string(),
                };
                output.push_str(&format!(" {cell:>cell_width$}"));
            }
            output.push('\n');
        }
        output.push_str("===============================================================\n");
        output
    }

    /// AUROC rows as CSV. Undefined cells are empty.
    ///
    /// # Errors
    /// Returns an error if the CSV writer fails.
    pub fn to_csv(&self) -> std::result::Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["score", "auroc", "lower", "upper", "n_positive", "n_negative"])?;
        for row in &self.rows {
            match row.result.value() {
                Some(r) => writer.write_record([
                    row.name.clone(),
                    format!("{:.6}", r.auroc),
                    format!("{:.6}", r.interval.lower),
                    format!("{:.6}", r.interval.upper),
                    r.n_positive.to_string(),
                    r.n_negative.to_string(),
                ])?,
                None => writer.write_record([row.name.as_str(), "", "", "", "", ""])?,
            }
        }
        csv_string(writer)
    }

    /// Comparison matrix as CSV, one line per `(first, second)` pair.
    ///
    /// # Errors
    /// Returns an error if the CSV writer fails.
    pub fn comparisons_to_csv(&self) -> std::result::Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["first", "second", "method", "p_value"])?;
        let names = &self.comparisons.names;
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let p_value = match self.comparisons.p_value(i, j) {
                    Some(Metric::Value(p)) => format!("{p:.6}"),
                    _ => String::new(),
                };
                writer.write_record([
                    names[i].clone(),
                    names[j].clone(),
                    self.comparisons.method.to_string(),
                    p_value,
                ])?;
            }
        }
        csv_string(writer)
    }
}

fn format_p_value(p: f64) -> String {
    if p < 0.0001 {
        "<0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn outcomes() -> Vec<bool> {
        (0..200).map(|i| i % 2 == 0).collect()
    }

    fn scores(outcomes: &[bool]) -> Vec<NamedScore> {
        let sirs = outcomes
            .iter()
            .enumerate()
            .map(|(i, &o)| (i % 5) as f64 + if o { 1.0 } else { 0.0 })
            .collect();
        let sofa = outcomes
            .iter()
            .enumerate()
            .map(|(i, &o)| (i % 7) as f64 + if o { 3.0 } else { 0.0 })
            .collect();
        let flat = vec![1.0; outcomes.len()];
        vec![
            NamedScore::new("SIRS", sirs),
            NamedScore::new("SOFA", sofa),
            NamedScore::new("flat", flat),
        ]
    }

    fn options(policy: FailurePolicy) -> AurocOptions {
        AurocOptions {
            bootstrap: BootstrapConfig::new(200, 0.95).with_seed(3),
            failure_policy: policy,
            ..AurocOptions::default()
        }
    }

    // ============================================================
    // build
    // ============================================================

    #[test]
    fn table_has_one_row_per_score_in_order() {
        let o = outcomes();
        let table = AurocTable::build(&scores(&o), &o, &[], &options(FailurePolicy::Abort)).unwrap();

        let names: Vec<&str> = table.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SIRS", "SOFA", "flat"]);
        let flat = table.rows[2].result.value().unwrap();
        assert!((flat.auroc - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn matrix_fills_upper_triangle_only() {
        let o = outcomes();
        let table = AurocTable::build(&scores(&o), &o, &[], &options(FailurePolicy::Abort)).unwrap();
        let m = &table.comparisons;

        assert_eq!(m.len(), 3);
        for i in 0..3 {
            assert!(m.p_value(i, i).is_none());
            for j in 0..i {
                assert!(m.p_value(i, j).is_none());
            }
            for j in (i + 1)..3 {
                let p = *m.p_value(i, j).unwrap().value().unwrap();
                assert!((0.0..=1.0).contains(&p));
            }
        }
        // SOFA separates far better than a constant
        assert!(*m.p_value(1, 2).unwrap().value().unwrap() < 0.01);
    }

    #[test]
    fn unseeded_bootstrap_table_resamples_every_score_alike() {
        let o = outcomes();
        let sofa = scores(&o).swap_remove(1);
        let twin = NamedScore::new("SOFA copy", sofa.values.clone());
        let opts = AurocOptions {
            bootstrap: BootstrapConfig::new(200, 0.95),
            interval: AurocIntervalMethod::Bootstrap,
            comparison: ComparisonMethod::PairedBootstrap,
            ..AurocOptions::default()
        };

        let table = AurocTable::build(&[sofa, twin], &o, &[], &opts).unwrap();
        let first = table.rows[0].result.value().unwrap();
        let second = table.rows[1].result.value().unwrap();
        assert_eq!(first.interval, second.interval);
        assert_eq!(table.comparisons.p_value(0, 1), Some(&Metric::Value(1.0)));
    }

    #[test]
    fn degenerate_score_is_placeholder_under_placeholder_policy() {
        let o = outcomes();
        let mut s = scores(&o);
        s.push(NamedScore::new("broken", vec![1.0; 10]));

        let table = AurocTable::build(&s, &o, &[], &options(FailurePolicy::Placeholder)).unwrap();
        assert!(!table.rows[3].result.is_defined());
        assert!(matches!(
            table.comparisons.p_value(0, 3),
            Some(Metric::Undefined { .. })
        ));
        assert!(table.to_text().contains("undefined"));
    }

    #[test]
    fn degenerate_score_aborts_under_abort_policy() {
        let o = outcomes();
        let mut s = scores(&o);
        s.push(NamedScore::new("broken", vec![1.0; 10]));

        let err = AurocTable::build(&s, &o, &[], &options(FailurePolicy::Abort)).unwrap_err();
        assert!(matches!(err, EvaluationError::ShapeMismatch { .. }));
    }

    #[test]
    fn adjusted_table_uses_covariates() {
        let o = outcomes();
        let age: Vec<f64> = (0..o.len()).map(|i| 50.0 + ((i / 4) % 30) as f64).collect();
        let covariates = [Covariate::new("age", age)];
        let opts = AurocOptions {
            adjustment: AurocAdjustment::BaselineRegression,
            ..options(FailurePolicy::Abort)
        };

        let table = AurocTable::build(&scores(&o), &o, &covariates, &opts).unwrap();
        assert_eq!(table.adjustment, AurocAdjustment::BaselineRegression);
        assert!(table.rows.iter().all(|r| r.result.is_defined()));
    }

    // ============================================================
    // Rendering
    // ============================================================

    #[test]
    fn text_shows_table_then_matrix() {
        let o = outcomes();
        let text = AurocTable::build(&scores(&o), &o, &[], &options(FailurePolicy::Abort))
            .unwrap()
            .to_text();

        let table_pos = text.find("AUROC").unwrap();
        let matrix_pos = text.find("PAIRWISE COMPARISON").unwrap();
        assert!(table_pos < matrix_pos);
        assert!(text.contains("0.500 ["));
        assert!(text.contains("delong"));
    }

    #[test]
    fn csv_outputs_rows_and_pairs() {
        let o = outcomes();
        let table = AurocTable::build(&scores(&o), &o, &[], &options(FailurePolicy::Abort)).unwrap();

        let rows = table.to_csv().unwrap();
        assert_eq!(rows.lines().count(), 4);
        assert!(rows.lines().nth(3).unwrap().starts_with("flat,0.500000,"));

        let pairs = table.comparisons_to_csv().unwrap();
        let lines: Vec<&str> = pairs.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("SIRS,SOFA,delong,"));
    }

    #[test]
    fn p_values_below_display_precision_are_bounded() {
        assert_eq!(format_p_value(1e-9), "<0.0001");
        assert_eq!(format_p_value(0.05), "0.0500");
    }
}
