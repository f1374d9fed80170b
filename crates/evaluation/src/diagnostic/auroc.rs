//! Area under the ROC curve and paired comparison of two AUROCs.
//!
//! AUROC is the Mann-Whitney probability that a random positive case scores
//! above a random negative case, ties counting one half. It is computed from
//! mid-ranks in O(n log n).
//!
//! Two scores evaluated on the same patients are correlated, so their AUROCs
//! are compared with a paired test: either the DeLong covariance of the two
//! U-statistics, or a bootstrap in which both scores see the same resample
//! indices.

use serde::{Deserialize, Serialize};
use sepsis3_core::{
    two_sided_p_value, z_for_confidence, AurocIntervalMethod, BootstrapConfig, ComparisonMethod,
};
use tracing::debug;

use super::bootstrap::{gather, BootstrapEstimator, ResamplePlan};
use super::interval::ConfidenceInterval;
use crate::error::{check_paired, EvaluationError, Result};

/// AUROC of one score with its interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AurocResult {
    pub auroc: f64,
    pub interval: ConfidenceInterval,
    pub n_positive: usize,
    pub n_negative: usize,
}

/// Paired test of equal AUROCs on a shared outcome vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub first: AurocResult,
    pub second: AurocResult,
    /// `first.auroc - second.auroc`.
    pub difference: f64,
    pub p_value: f64,
    pub method: ComparisonMethod,
}

/// 1-based ranks with tied values sharing their average rank.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn midranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j - 1) as f64 / 2.0 + 1.0;
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        i = j;
    }
    ranks
}

/// Rank-based AUROC of `scores` against `outcomes`.
///
/// # Errors
/// `ShapeMismatch`/`EmptyInput` for bad vectors, `NonFiniteValue` for a NaN
/// or infinite score, `DegenerateInput` when either class is absent.
pub fn auroc(scores: &[f64], outcomes: &[bool]) -> Result<f64> {
    Components::compute(scores, outcomes).map(|c| c.auroc)
}

/// DeLong variance estimate of the AUROC.
///
/// # Errors
/// As [`auroc`]; also `DegenerateInput` with fewer than two cases in either
/// class.
pub fn delong_variance(scores: &[f64], outcomes: &[bool]) -> Result<f64> {
    let c = Components::compute(scores, outcomes)?;
    c.require_variance()?;
    Ok(c.covariance(&c))
}

/// DeLong structural components of one score.
struct Components {
    auroc: f64,
    /// One per positive case: share of negatives it outranks.
    v10: Vec<f64>,
    /// One per negative case: share of positives that outrank it.
    v01: Vec<f64>,
}

impl Components {
    fn compute(scores: &[f64], outcomes: &[bool]) -> Result<Self> {
        check_paired(outcomes.len(), scores.len())?;
        if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
            return Err(EvaluationError::NonFiniteValue { index });
        }

        let positives: Vec<f64> = scores
            .iter()
            .zip(outcomes)
            .filter_map(|(&s, &o)| o.then_some(s))
            .collect();
        let negatives: Vec<f64> = scores
            .iter()
            .zip(outcomes)
            .filter_map(|(&s, &o)| (!o).then_some(s))
            .collect();
        let m = positives.len();
        let n = negatives.len();
        if m == 0 {
            return Err(EvaluationError::undefined("AUROC", "no positive outcomes"));
        }
        if n == 0 {
            return Err(EvaluationError::undefined("AUROC", "no negative outcomes"));
        }

        // Ranks within the pooled sample and within each class
        let pooled = midranks(&[positives.as_slice(), negatives.as_slice()].concat());
        let within_pos = midranks(&positives);
        let within_neg = midranks(&negatives);

        let (m_f, n_f) = (m as f64, n as f64);
        let v10: Vec<f64> = (0..m)
            .map(|i| (pooled[i] - within_pos[i]) / n_f)
            .collect();
        let v01: Vec<f64> = (0..n)
            .map(|j| 1.0 - (pooled[m + j] - within_neg[j]) / m_f)
            .collect();

        let rank_sum: f64 = pooled[..m].iter().sum();
        let auroc = (rank_sum - m_f * (m_f + 1.0) / 2.0) / (m_f * n_f);

        Ok(Self {
            auroc: auroc.clamp(0.0, 1.0),
            v10,
            v01,
        })
    }

    fn n_positive(&self) -> usize {
        self.v10.len()
    }

    fn n_negative(&self) -> usize {
        self.v01.len()
    }

    fn require_variance(&self) -> Result<()> {
        if self.n_positive() < 2 || self.n_negative() < 2 {
            return Err(EvaluationError::undefined(
                "DeLong variance",
                "needs at least two positive and two negative outcomes",
            ));
        }
        Ok(())
    }

    /// `Cov(AUC_self, AUC_other)`; the variance when `other` is `self`.
    fn covariance(&self, other: &Self) -> f64 {
        sample_covariance(&self.v10, &other.v10) / self.n_positive() as f64
            + sample_covariance(&self.v01, &other.v01) / self.n_negative() as f64
    }
}

fn sample_covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / (n - 1.0)
}

/// Computes AUROCs with intervals and compares pairs of them.
pub struct AurocComparator {
    estimator: BootstrapEstimator,
    interval: AurocIntervalMethod,
    comparison: ComparisonMethod,
}

impl AurocComparator {
    #[must_use]
    pub fn new(
        config: BootstrapConfig,
        interval: AurocIntervalMethod,
        comparison: ComparisonMethod,
    ) -> Self {
        Self {
            estimator: BootstrapEstimator::new(config),
            interval,
            comparison,
        }
    }

    /// DeLong interval and DeLong comparison.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            BootstrapConfig::default(),
            AurocIntervalMethod::default(),
            ComparisonMethod::default(),
        )
    }

    #[must_use]
    pub fn comparison_method(&self) -> ComparisonMethod {
        self.comparison
    }

    /// Draws the resample plan shared by every bootstrap in a comparison.
    #[must_use]
    pub fn plan(&self, sample_size: usize) -> ResamplePlan {
        self.estimator.plan(sample_size)
    }

    /// AUROC of `scores` with an interval at the configured confidence level.
    ///
    /// # Errors
    /// As [`auroc`]. A DeLong interval also needs two cases per class; a
    /// bootstrap interval can fail with `InsufficientData`.
    pub fn auroc(&self, scores: &[f64], outcomes: &[bool]) -> Result<AurocResult> {
        check_paired(outcomes.len(), scores.len())?;
        self.auroc_with_plan(&self.plan(outcomes.len()), scores, outcomes)
    }

    /// As [`Self::auroc`], bootstrapping over `plan`. DeLong intervals
    /// ignore the plan.
    ///
    /// # Errors
    /// See [`Self::auroc`]; also `ShapeMismatch` if the plan was drawn for a
    /// different sample size.
    pub fn auroc_with_plan(
        &self,
        plan: &ResamplePlan,
        scores: &[f64],
        outcomes: &[bool],
    ) -> Result<AurocResult> {
        let c = Components::compute(scores, outcomes)?;
        let interval = match self.interval {
            AurocIntervalMethod::DeLong => {
                c.require_variance()?;
                let z = z_for_confidence(self.estimator.config().confidence_level);
                let se = c.covariance(&c).max(0.0).sqrt();
                ConfidenceInterval::new(c.auroc, c.auroc - z * se, c.auroc + z * se).clamp_unit()
            }
            AurocIntervalMethod::Bootstrap => {
                self.estimator
                    .estimate_with_plan(plan, auroc, scores, outcomes)?
                    .interval
            }
        };

        Ok(AurocResult {
            auroc: c.auroc,
            interval,
            n_positive: c.n_positive(),
            n_negative: c.n_negative(),
        })
    }

    /// Tests whether two scores have equal AUROC on the same `outcomes`.
    ///
    /// Both intervals and the paired bootstrap difference use one resample
    /// plan, seeded or not.
    ///
    /// # Errors
    /// `ShapeMismatch` if either score is not aligned with `outcomes`; any
    /// error from [`Self::auroc`] or the comparison test.
    pub fn compare(
        &self,
        scores_a: &[f64],
        scores_b: &[f64],
        outcomes: &[bool],
    ) -> Result<ComparisonResult> {
        check_paired(outcomes.len(), scores_a.len())?;
        check_paired(outcomes.len(), scores_b.len())?;
        self.compare_with_plan(&self.plan(outcomes.len()), scores_a, scores_b, outcomes)
    }

    /// As [`Self::compare`], resampling over `plan`.
    ///
    /// # Errors
    /// See [`Self::compare`].
    pub fn compare_with_plan(
        &self,
        plan: &ResamplePlan,
        scores_a: &[f64],
        scores_b: &[f64],
        outcomes: &[bool],
    ) -> Result<ComparisonResult> {
        check_paired(outcomes.len(), scores_a.len())?;
        check_paired(outcomes.len(), scores_b.len())?;

        let first = self.auroc_with_plan(plan, scores_a, outcomes)?;
        let second = self.auroc_with_plan(plan, scores_b, outcomes)?;
        let difference = first.auroc - second.auroc;
        let p_value = self.p_value_with_plan(plan, scores_a, scores_b, outcomes)?;

        Ok(ComparisonResult {
            first,
            second,
            difference,
            p_value,
            method: self.comparison,
        })
    }

    /// Two-sided p-value for `AUC(a) == AUC(b)` with the configured method,
    /// without computing either interval.
    ///
    /// # Errors
    /// `ShapeMismatch` for misaligned vectors; any error from the test.
    pub fn p_value_with_plan(
        &self,
        plan: &ResamplePlan,
        scores_a: &[f64],
        scores_b: &[f64],
        outcomes: &[bool],
    ) -> Result<f64> {
        check_paired(outcomes.len(), scores_a.len())?;
        check_paired(outcomes.len(), scores_b.len())?;

        let p_value = match self.comparison {
            ComparisonMethod::DeLong => delong_p_value(scores_a, scores_b, outcomes)?,
            ComparisonMethod::PairedBootstrap => {
                self.bootstrap_p_value(plan, scores_a, scores_b, outcomes)?
            }
        };
        debug!(p_value, method = %self.comparison, "Compared AUROCs");
        Ok(p_value)
    }

    fn bootstrap_p_value(
        &self,
        plan: &ResamplePlan,
        scores_a: &[f64],
        scores_b: &[f64],
        outcomes: &[bool],
    ) -> Result<f64> {
        self.estimator.validate()?;
        check_paired(plan.sample_size(), outcomes.len())?;
        let difference = auroc(scores_a, outcomes)? - auroc(scores_b, outcomes)?;
        let values = self.estimator.map_resamples(plan, |indices| {
            let o = gather(outcomes, indices);
            Ok(auroc(&gather(scores_a, indices), &o)? - auroc(&gather(scores_b, indices), &o)?)
        })?;
        let result = self.estimator.summarize(difference, values)?;

        let total = result.distribution.len() as f64;
        let at_most_zero = result.distribution.iter().filter(|&&d| d <= 0.0).count() as f64;
        let at_least_zero = result.distribution.iter().filter(|&&d| d >= 0.0).count() as f64;
        Ok((2.0 * (at_most_zero / total).min(at_least_zero / total)).min(1.0))
    }
}

/// Two-sided DeLong p-value for `AUC(a) == AUC(b)`.
///
/// A zero variance of the difference gives 1.0 when the AUROCs are equal
/// and 0.0 otherwise.
///
/// # Errors
/// As [`delong_variance`] for either score.
#[allow(clippy::float_cmp)]
pub fn delong_p_value(scores_a: &[f64], scores_b: &[f64], outcomes: &[bool]) -> Result<f64> {
    let a = Components::compute(scores_a, outcomes)?;
    let b = Components::compute(scores_b, outcomes)?;
    a.require_variance()?;

    let difference = a.auroc - b.auroc;
    let variance = a.covariance(&a) + b.covariance(&b) - 2.0 * a.covariance(&b);
    if variance.is_nan() || variance <= 0.0 {
        return Ok(if difference == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(two_sided_p_value(difference / variance.sqrt()).clamp(0.0, 1.0))
}
