//! Baseline-risk adjustment of a score before AUROC.
//!
//! Each [`AurocAdjustment`] variant is its own code path:
//!
//! - `None` passes the score through.
//! - `BaselineRegression` fits a logistic model of the outcome on the
//!   baseline covariates plus the score and returns the fitted linear
//!   predictor.
//! - `FractionalPolynomial` does the same after replacing each continuous
//!   covariate with its best first-degree fractional polynomial.
//!
//! Fits use IRLS with step halving and a small ridge on the non-intercept
//! terms so quasi-separated data still yields finite coefficients.

use faer::linalg::solvers::{Llt as FaerLlt, Solve};
use faer::{Mat as FaerMat, Side};
use ndarray::{Array1, Array2, Axis};
use sepsis3_core::AurocAdjustment;
use tracing::{debug, info};

use crate::error::{check_paired, EvaluationError, Result};

/// Candidate FP1 powers; 0 stands for the natural log.
pub const FP1_POWERS: [f64; 8] = [-2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0, 3.0];

const MAX_ITERATIONS: usize = 100;
const MAX_HALVINGS: usize = 30;
const RIDGE: f64 = 1e-6;
const MIN_WEIGHT: f64 = 1e-6;
const PROB_EPS: f64 = 1e-10;
const TOLERANCE: f64 = 1e-9;

/// Fitted logistic regression.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticFit {
    /// Intercept first, then one coefficient per column, on the original scale.
    pub coefficients: Vec<f64>,
    /// Unpenalized log-likelihood at the fitted coefficients.
    pub log_likelihood: f64,
    pub iterations: usize,
}

impl LogisticFit {
    /// Linear predictor `b0 + sum(b_j * x_j)` for every row.
    #[must_use]
    pub fn linear_predictor(&self, columns: &[Vec<f64>]) -> Vec<f64> {
        let n = columns.first().map_or(0, Vec::len);
        (0..n)
            .map(|i| {
                self.coefficients[0]
                    + columns
                        .iter()
                        .zip(&self.coefficients[1..])
                        .map(|(col, b)| b * col[i])
                        .sum::<f64>()
            })
            .collect()
    }
}

/// Fits `logit P(y) = b0 + sum(b_j * x_j)` by IRLS.
///
/// Columns are standardized internally; the returned coefficients are on
/// the original scale.
///
/// # Errors
/// `ShapeMismatch`/`EmptyInput` for bad columns, `NonFiniteValue` for NaN or
/// infinite covariates, `DegenerateInput` if one outcome class is absent,
/// `NonConvergence` when IRLS runs out of iterations.
pub fn fit_logistic(columns: &[Vec<f64>], outcomes: &[bool]) -> Result<LogisticFit> {
    let n = outcomes.len();
    for column in columns {
        check_paired(n, column.len())?;
        if let Some(index) = column.iter().position(|v| !v.is_finite()) {
            return Err(EvaluationError::NonFiniteValue { index });
        }
    }
    if n == 0 {
        return Err(EvaluationError::EmptyInput);
    }
    let positives = outcomes.iter().filter(|&&o| o).count();
    if positives == 0 || positives == n {
        return Err(EvaluationError::undefined(
            "Logistic regression",
            "outcome has a single class",
        ));
    }

    let (x, means, scales) = standardized_design(columns, n);
    let y: Array1<f64> = outcomes.iter().map(|&o| f64::from(u8::from(o))).collect();
    let p = x.ncols();

    let mut beta = Array1::<f64>::zeros(p);
    let mut objective = penalized_log_likelihood(&x, &y, &beta);

    for iteration in 1..=MAX_ITERATIONS {
        let eta = x.dot(&beta);
        let mu = eta.mapv(sigmoid);
        let weights = mu.mapv(|m| (m * (1.0 - m)).max(MIN_WEIGHT));

        // Score and Fisher information of the penalized likelihood
        let mut gradient = x.t().dot(&(&y - &mu));
        let weighted = &x * &weights.view().insert_axis(Axis(1));
        let mut information = x.t().dot(&weighted);
        for j in 1..p {
            gradient[j] -= RIDGE * beta[j];
            information[[j, j]] += RIDGE;
        }

        let step = cholesky_solve(&information, &gradient)?;

        // Step halving keeps the penalized likelihood from decreasing
        let mut scale = 1.0;
        let mut candidate = &beta + &step;
        let mut candidate_objective = penalized_log_likelihood(&x, &y, &candidate);
        let mut halvings = 0;
        while candidate_objective < objective && halvings < MAX_HALVINGS {
            scale *= 0.5;
            candidate = &beta + &(&step * scale);
            candidate_objective = penalized_log_likelihood(&x, &y, &candidate);
            halvings += 1;
        }

        let max_change = (&candidate - &beta)
            .iter()
            .fold(0.0_f64, |acc, d| acc.max(d.abs()));
        let gain = candidate_objective - objective;
        beta = candidate;
        objective = candidate_objective;

        if max_change < TOLERANCE || gain.abs() < TOLERANCE * (objective.abs() + 1.0) {
            let coefficients = unstandardize(&beta, &means, &scales);
            let log_likelihood = log_likelihood(&x, &y, &beta);
            debug!(iteration, log_likelihood, "Logistic regression converged");
            return Ok(LogisticFit {
                coefficients,
                log_likelihood,
                iterations: iteration,
            });
        }
    }

    Err(EvaluationError::NonConvergence {
        iterations: MAX_ITERATIONS,
    })
}

/// Design matrix with an intercept column and standardized covariates.
fn standardized_design(columns: &[Vec<f64>], n: usize) -> (Array2<f64>, Vec<f64>, Vec<f64>) {
    let mut x = Array2::<f64>::ones((n, columns.len() + 1));
    let mut means = Vec::with_capacity(columns.len());
    let mut scales = Vec::with_capacity(columns.len());
    for (j, column) in columns.iter().enumerate() {
        let mean = column.iter().sum::<f64>() / n as f64;
        let sd = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
        let scale = if sd > 0.0 { sd } else { 1.0 };
        for (i, v) in column.iter().enumerate() {
            x[[i, j + 1]] = (v - mean) / scale;
        }
        means.push(mean);
        scales.push(scale);
    }
    (x, means, scales)
}

fn unstandardize(beta: &Array1<f64>, means: &[f64], scales: &[f64]) -> Vec<f64> {
    let slopes: Vec<f64> = scales
        .iter()
        .enumerate()
        .map(|(j, s)| beta[j + 1] / s)
        .collect();
    let intercept = beta[0] - slopes.iter().zip(means).map(|(b, m)| b * m).sum::<f64>();
    std::iter::once(intercept).chain(slopes).collect()
}

fn sigmoid(eta: f64) -> f64 {
    (1.0 / (1.0 + (-eta.clamp(-700.0, 700.0)).exp())).clamp(PROB_EPS, 1.0 - PROB_EPS)
}

fn log_likelihood(x: &Array2<f64>, y: &Array1<f64>, beta: &Array1<f64>) -> f64 {
    x.dot(beta)
        .iter()
        .zip(y)
        .map(|(&eta, &yi)| {
            let mu = sigmoid(eta);
            yi * mu.ln() + (1.0 - yi) * (1.0 - mu).ln()
        })
        .sum()
}

fn penalized_log_likelihood(x: &Array2<f64>, y: &Array1<f64>, beta: &Array1<f64>) -> f64 {
    let penalty: f64 = beta.iter().skip(1).map(|b| b * b).sum();
    log_likelihood(x, y, beta) - 0.5 * RIDGE * penalty
}

/// Solves `a * x = b` for symmetric positive definite `a` by an LLT
/// factorization.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(EvaluationError::InvalidParameter(
            "information matrix has non-finite entries".to_string(),
        ));
    }

    let n = b.len();
    let a_f = FaerMat::<f64>::from_fn(n, n, |i, j| a[[i, j]]);
    let b_f = FaerMat::<f64>::from_fn(n, 1, |i, _| b[i]);
    let factor = FaerLlt::new(a_f.as_ref(), Side::Lower).map_err(|_| {
        EvaluationError::InvalidParameter(
            "information matrix is not positive definite".to_string(),
        )
    })?;
    let x = factor.solve(b_f.as_ref());
    Ok(Array1::from_shape_fn(n, |i| x[(i, 0)]))
}

/// FP1 transform `x^power`, with `power == 0` meaning `ln(x)`.
///
/// Callers shift `x` to be positive first (see [`shift_positive`]).
#[must_use]
pub fn fp_transform(x: f64, power: f64) -> f64 {
    if power == 0.0 {
        x.ln()
    } else {
        x.powf(power)
    }
}

/// Shifts a column to `x - min + 1` when it has a non-positive value.
#[must_use]
pub fn shift_positive(column: &[f64]) -> Vec<f64> {
    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
    if min > 0.0 {
        column.to_vec()
    } else {
        column.iter().map(|v| v - min + 1.0).collect()
    }
}

/// True when a column has more than two distinct values.
fn is_continuous(column: &[f64]) -> bool {
    let mut distinct: Vec<f64> = Vec::with_capacity(3);
    for &v in column {
        if !distinct.iter().any(|d| d.total_cmp(&v).is_eq()) {
            distinct.push(v);
            if distinct.len() > 2 {
                return true;
            }
        }
    }
    false
}

/// Best FP1 power for `column` by univariate logistic log-likelihood.
///
/// Powers whose fit fails to converge are skipped; ties keep the earlier
/// power in [`FP1_POWERS`].
///
/// # Errors
/// `NonConvergence` when no candidate power converges, or any other fit error.
pub fn select_fp1_power(column: &[f64], outcomes: &[bool]) -> Result<f64> {
    let shifted = shift_positive(column);
    let mut best: Option<(f64, f64)> = None;
    for power in FP1_POWERS {
        let transformed: Vec<f64> = shifted.iter().map(|&v| fp_transform(v, power)).collect();
        let fit = match fit_logistic(&[transformed], outcomes) {
            Ok(fit) => fit,
            Err(EvaluationError::NonConvergence { .. }) => continue,
            Err(e) => return Err(e),
        };
        if best.map_or(true, |(_, ll)| fit.log_likelihood > ll) {
            best = Some((power, fit.log_likelihood));
        }
    }
    best.map(|(power, _)| power)
        .ok_or(EvaluationError::NonConvergence {
            iterations: MAX_ITERATIONS,
        })
}

/// Named baseline covariate column.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub name: String,
    pub values: Vec<f64>,
}

impl Covariate {
    #[must_use]
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

/// Applies one [`AurocAdjustment`] to any number of scores.
///
/// Covariate transforms are chosen once, on construction, and reused for
/// every score.
#[derive(Debug, Clone)]
pub struct BaselineAdjuster {
    adjustment: AurocAdjustment,
    columns: Vec<Vec<f64>>,
    /// FP1 power per covariate; `None` for untransformed columns.
    powers: Vec<Option<f64>>,
}

impl BaselineAdjuster {
    /// Prepares the covariate design for `adjustment`.
    ///
    /// # Errors
    /// `InvalidParameter` if a regression adjustment has no covariates;
    /// shape errors for misaligned columns; FP selection errors.
    pub fn new(
        adjustment: AurocAdjustment,
        covariates: &[Covariate],
        outcomes: &[bool],
    ) -> Result<Self> {
        for covariate in covariates {
            check_paired(outcomes.len(), covariate.values.len())?;
        }

        let (columns, powers) = match adjustment {
            AurocAdjustment::None => (Vec::new(), Vec::new()),
            AurocAdjustment::BaselineRegression => {
                require_covariates(covariates)?;
                (
                    covariates.iter().map(|c| c.values.clone()).collect(),
                    vec![None; covariates.len()],
                )
            }
            AurocAdjustment::FractionalPolynomial => {
                require_covariates(covariates)?;
                let mut columns = Vec::with_capacity(covariates.len());
                let mut powers = Vec::with_capacity(covariates.len());
                for covariate in covariates {
                    if is_continuous(&covariate.values) {
                        let power = select_fp1_power(&covariate.values, outcomes)?;
                        info!(covariate = %covariate.name, power, "Selected FP1 transform");
                        columns.push(
                            shift_positive(&covariate.values)
                                .into_iter()
                                .map(|v| fp_transform(v, power))
                                .collect(),
                        );
                        powers.push(Some(power));
                    } else {
                        columns.push(covariate.values.clone());
                        powers.push(None);
                    }
                }
                (columns, powers)
            }
        };

        Ok(Self {
            adjustment,
            columns,
            powers,
        })
    }

    #[must_use]
    pub fn adjustment(&self) -> AurocAdjustment {
        self.adjustment
    }

    /// FP1 power chosen per covariate, in covariate order.
    #[must_use]
    pub fn powers(&self) -> &[Option<f64>] {
        &self.powers
    }

    /// Adjusted score: the raw score for `None`, otherwise the fitted linear
    /// predictor of the outcome on the covariates plus `score`.
    ///
    /// # Errors
    /// Shape errors or regression errors from [`fit_logistic`].
    pub fn adjust(&self, score: &[f64], outcomes: &[bool]) -> Result<Vec<f64>> {
        check_paired(outcomes.len(), score.len())?;
        match self.adjustment {
            AurocAdjustment::None => Ok(score.to_vec()),
            AurocAdjustment::BaselineRegression | AurocAdjustment::FractionalPolynomial => {
                let mut columns = self.columns.clone();
                columns.push(score.to_vec());
                let fit = fit_logistic(&columns, outcomes)?;
                Ok(fit.linear_predictor(&columns))
            }
        }
    }
}

fn require_covariates(covariates: &[Covariate]) -> Result<()> {
    if covariates.is_empty() {
        return Err(EvaluationError::InvalidParameter(
            "baseline adjustment needs at least one covariate".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::auroc::auroc;

    // ============================================================
    // Test Helpers
    // ============================================================

    /// 400 stays, every other one positive.
    fn outcomes() -> Vec<bool> {
        (0..400).map(|i| i % 2 == 0).collect()
    }

    /// Shifted up by 1.5 for positives, with overlap.
    fn score(outcomes: &[bool]) -> Vec<f64> {
        outcomes
            .iter()
            .enumerate()
            .map(|(i, &o)| ((i / 2) % 5) as f64 + if o { 1.5 } else { 0.0 })
            .collect()
    }

    /// Informative and independent of `score` within each class.
    fn baseline(outcomes: &[bool]) -> Vec<f64> {
        outcomes
            .iter()
            .enumerate()
            .map(|(i, &o)| ((i / 10) % 4) as f64 + if o { 1.0 } else { 0.0 })
            .collect()
    }

    /// `count` rows with x = `x`, `positives` of them with the outcome.
    fn group(x: f64, count: usize, positives: usize) -> (Vec<f64>, Vec<bool>) {
        ((0..count).map(|_| x).collect(), (0..count).map(|i| i < positives).collect())
    }

    // ============================================================
    // Logistic regression
    // ============================================================

    #[test]
    fn logistic_recovers_log_odds() {
        // x = 0: odds 1/3, x = 1: odds 3
        let (mut x, mut y) = group(0.0, 40, 10);
        let (x1, y1) = group(1.0, 40, 30);
        x.extend(x1);
        y.extend(y1);

        let fit = fit_logistic(&[x], &y).unwrap();
        let expected_intercept = (1.0_f64 / 3.0).ln();
        let expected_slope = 2.0 * 3.0_f64.ln();
        assert!((fit.coefficients[0] - expected_intercept).abs() < 1e-4, "{fit:?}");
        assert!((fit.coefficients[1] - expected_slope).abs() < 1e-4, "{fit:?}");
        assert!(fit.log_likelihood < 0.0);
    }

    #[test]
    fn intercept_only_matches_prevalence() {
        let (_, y) = group(0.0, 50, 10);
        let fit = fit_logistic(&[], &y).unwrap();
        assert!((fit.coefficients[0] - (10.0_f64 / 40.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn separated_data_stays_finite() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<bool> = (0..20).map(|i| i >= 10).collect();
        match fit_logistic(&[x], &y) {
            Ok(fit) => assert!(fit.coefficients.iter().all(|b| b.is_finite())),
            Err(e) => assert!(matches!(e, EvaluationError::NonConvergence { .. })),
        }
    }

    #[test]
    fn single_class_outcome_is_degenerate() {
        let err = fit_logistic(&[vec![1.0, 2.0]], &[true, true]).unwrap_err();
        assert!(matches!(err, EvaluationError::DegenerateInput(_)));
    }

    #[test]
    fn misaligned_column_is_rejected() {
        let err = fit_logistic(&[vec![1.0, 2.0, 3.0]], &[true, false]).unwrap_err();
        assert!(matches!(err, EvaluationError::ShapeMismatch { .. }));
    }

    #[test]
    fn cholesky_solves_small_system() {
        let a = ndarray::array![[4.0, 2.0], [2.0, 3.0]];
        let b = ndarray::array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let a = ndarray::array![[1.0, 2.0], [2.0, 1.0]];
        let b = ndarray::array![1.0, 1.0];
        let err = cholesky_solve(&a, &b).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidParameter(_)));
    }

    #[test]
    fn cholesky_rejects_non_finite_entries() {
        let a = ndarray::array![[f64::NAN, 0.0], [0.0, 1.0]];
        let b = ndarray::array![1.0, 1.0];
        assert!(cholesky_solve(&a, &b).is_err());
    }

    // ============================================================
    // Fractional polynomials
    // ============================================================

    #[test]
    fn fp_transform_uses_log_for_power_zero() {
        assert!((fp_transform(std::f64::consts::E, 0.0) - 1.0).abs() < 1e-12);
        assert!((fp_transform(4.0, 0.5) - 2.0).abs() < 1e-12);
        assert!((fp_transform(2.0, -2.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn shift_positive_only_moves_non_positive_columns() {
        assert_eq!(shift_positive(&[1.0, 2.0]), vec![1.0, 2.0]);
        assert_eq!(shift_positive(&[-1.0, 0.0, 2.0]), vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn continuity_needs_three_values() {
        assert!(!is_continuous(&[0.0, 1.0, 1.0, 0.0]));
        assert!(is_continuous(&[0.0, 1.0, 2.0]));
    }

    #[test]
    fn selected_power_fits_at_least_as_well_as_linear() {
        let o = outcomes();
        let x = baseline(&o);
        let power = select_fp1_power(&x, &o).unwrap();
        assert!(FP1_POWERS.contains(&power));

        let shifted = shift_positive(&x);
        let fit = |p: f64| {
            let t: Vec<f64> = shifted.iter().map(|&v| fp_transform(v, p)).collect();
            fit_logistic(&[t], &o).unwrap().log_likelihood
        };
        assert!(fit(power) >= fit(1.0) - 1e-9);
    }

    // ============================================================
    // BaselineAdjuster
    // ============================================================

    #[test]
    fn no_adjustment_passes_score_through() {
        let o = outcomes();
        let s = score(&o);
        let adjuster = BaselineAdjuster::new(AurocAdjustment::None, &[], &o).unwrap();
        assert_eq!(adjuster.adjust(&s, &o).unwrap(), s);
    }

    #[test]
    fn regression_adjustment_needs_covariates() {
        let o = outcomes();
        let err = BaselineAdjuster::new(AurocAdjustment::BaselineRegression, &[], &o).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidParameter(_)));
    }

    #[test]
    fn informative_baseline_raises_auroc() {
        let o = outcomes();
        let s = score(&o);
        let covariates = [Covariate::new("age", baseline(&o))];

        for adjustment in [
            AurocAdjustment::BaselineRegression,
            AurocAdjustment::FractionalPolynomial,
        ] {
            let adjuster = BaselineAdjuster::new(adjustment, &covariates, &o).unwrap();
            let adjusted = adjuster.adjust(&s, &o).unwrap();
            assert_eq!(adjusted.len(), s.len());
            assert!(
                auroc(&adjusted, &o).unwrap() > auroc(&s, &o).unwrap(),
                "{adjustment}"
            );
        }
    }

    #[test]
    fn binary_covariates_are_not_transformed() {
        let o = outcomes();
        let male: Vec<f64> = (0..o.len()).map(|i| ((i / 3) % 2) as f64).collect();
        let covariates = [
            Covariate::new("is_male", male),
            Covariate::new("age", baseline(&o)),
        ];
        let adjuster =
            BaselineAdjuster::new(AurocAdjustment::FractionalPolynomial, &covariates, &o).unwrap();
        assert_eq!(adjuster.powers()[0], None);
        assert!(adjuster.powers()[1].is_some());
    }
}
