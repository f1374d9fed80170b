//! Paired bootstrap confidence intervals for diagnostic statistics.
//!
//! Each resample draws observation indices with replacement and applies the
//! same indices to predictions and outcomes, so the pairing of a patient's
//! prediction with their outcome is never broken. The interval is the
//! empirical percentile interval of the statistic over resamples; the point
//! estimate is the statistic on the original data.
//!
//! Random state is explicit: a [`ResamplePlan`] holds one seed per resample,
//! drawn from a `ChaCha8Rng`. Sharing a plan between two statistics gives
//! both of them identical resample indices, which paired comparisons rely on.
//!
//! # Example
//!
//! ```ignore
//! use sepsis3_evaluation::diagnostic::bootstrap::{BootstrapConfig, BootstrapEstimator};
//! use sepsis3_evaluation::diagnostic::confusion::RateKind;
//!
//! let config = BootstrapConfig::default().with_seed(42);
//! let estimator = BootstrapEstimator::new(config);
//! let ci = estimator.estimate_rate(RateKind::Sensitivity, &predictions, &outcomes)?;
//!
//! println!("Sens: {:.2} [{:.2}, {:.2}]", ci.point_estimate, ci.lower, ci.upper);
//! ```

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use sepsis3_core::BootstrapConfig;

use super::confusion::{ConfusionMatrix, RateKind};
use super::interval::ConfidenceInterval;
use crate::error::{check_paired, EvaluationError, Result};

/// Per-resample seeds over a sample of fixed size.
///
/// Indices for resample `i` are regenerated from its own seed on demand,
/// so evaluation order (sequential or parallel) never changes the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResamplePlan {
    sample_size: usize,
    seeds: Vec<u64>,
}

impl ResamplePlan {
    /// Draws `n_resamples` seeds from `rng` for a sample of `sample_size`.
    ///
    /// Threading one generator through several calls gives every plan
    /// distinct, reproducible seeds.
    #[must_use]
    pub fn from_rng(sample_size: usize, n_resamples: usize, rng: &mut ChaCha8Rng) -> Self {
        let seeds = (0..n_resamples).map(|_| rng.next_u64()).collect();
        Self { sample_size, seeds }
    }

    /// Number of resamples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Number of observations each resample draws.
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Indices of resample `resample`, drawn with replacement from `[0, n)`.
    ///
    /// # Panics
    /// Panics if `resample >= self.len()`.
    #[must_use]
    pub fn indices(&self, resample: usize) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seeds[resample]);
        let n = self.sample_size;
        (0..n).map(|_| rng.gen_range(0..n)).collect()
    }
}

/// Result of a bootstrap estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Point estimate with its percentile interval.
    pub interval: ConfidenceInterval,
    /// Bootstrap standard error.
    pub standard_error: f64,
    /// Estimated bias (mean of bootstrap - point estimate).
    pub bias: f64,
    /// Resamples drawn.
    pub n_resamples: usize,
    /// Resamples excluded because the statistic was undefined.
    pub n_degenerate: usize,
    /// Bootstrap distribution of the non-degenerate resamples (sorted).
    #[serde(skip)]
    pub distribution: Vec<f64>,
}

/// Bootstrap resampler for paired prediction/outcome vectors.
pub struct BootstrapEstimator {
    config: BootstrapConfig,
}

impl BootstrapEstimator {
    /// Creates a new estimator with the given configuration.
    #[must_use]
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    /// Creates an estimator with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BootstrapConfig::default())
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Checks the configuration ranges.
    ///
    /// # Errors
    /// `InvalidParameter` for zero resamples, a confidence level outside
    /// `(0, 1)` or a degenerate fraction outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let c = &self.config;
        if c.n_resamples == 0 {
            return Err(EvaluationError::InvalidParameter(
                "n_resamples must be at least 1".to_string(),
            ));
        }
        if !(c.confidence_level > 0.0 && c.confidence_level < 1.0) {
            return Err(EvaluationError::InvalidParameter(format!(
                "confidence_level must be in (0, 1), got {}",
                c.confidence_level
            )));
        }
        if !(0.0..=1.0).contains(&c.max_degenerate_fraction) {
            return Err(EvaluationError::InvalidParameter(format!(
                "max_degenerate_fraction must be in [0, 1], got {}",
                c.max_degenerate_fraction
            )));
        }
        Ok(())
    }

    /// Creates the generator for this estimator: seeded from the config, or
    /// from OS entropy when no seed is set (non-reproducible across runs).
    #[must_use]
    pub fn rng(&self) -> ChaCha8Rng {
        let seed = self.config.seed.unwrap_or_else(|| {
            let seed = ChaCha8Rng::from_entropy().next_u64();
            debug!(seed, "No bootstrap seed configured, drew one from entropy");
            seed
        });
        ChaCha8Rng::seed_from_u64(seed)
    }

    /// Draws a resample plan for `sample_size` observations from [`Self::rng`].
    #[must_use]
    pub fn plan(&self, sample_size: usize) -> ResamplePlan {
        ResamplePlan::from_rng(sample_size, self.config.n_resamples, &mut self.rng())
    }

    /// Bootstraps `statistic_fn` and returns its percentile interval.
    ///
    /// # Errors
    /// `ShapeMismatch`/`EmptyInput` for bad vectors, the statistic's own
    /// error on the original data, or `InsufficientData` when too many
    /// resamples are degenerate.
    pub fn estimate<P, F>(
        &self,
        statistic_fn: F,
        predictions: &[P],
        outcomes: &[bool],
    ) -> Result<ConfidenceInterval>
    where
        P: Copy + Send + Sync,
        F: Fn(&[P], &[bool]) -> Result<f64> + Sync,
    {
        self.estimate_detailed(statistic_fn, predictions, outcomes)
            .map(|r| r.interval)
    }

    /// As [`Self::estimate`], returning the full [`BootstrapResult`].
    ///
    /// # Errors
    /// See [`Self::estimate`].
    pub fn estimate_detailed<P, F>(
        &self,
        statistic_fn: F,
        predictions: &[P],
        outcomes: &[bool],
    ) -> Result<BootstrapResult>
    where
        P: Copy + Send + Sync,
        F: Fn(&[P], &[bool]) -> Result<f64> + Sync,
    {
        check_paired(outcomes.len(), predictions.len())?;
        self.validate()?;
        let plan = self.plan(outcomes.len());
        self.estimate_with_plan(&plan, statistic_fn, predictions, outcomes)
    }

    /// Bootstraps `statistic_fn` over an existing plan.
    ///
    /// # Errors
    /// See [`Self::estimate`]; also `ShapeMismatch` if the plan was drawn
    /// for a different sample size.
    pub fn estimate_with_plan<P, F>(
        &self,
        plan: &ResamplePlan,
        statistic_fn: F,
        predictions: &[P],
        outcomes: &[bool],
    ) -> Result<BootstrapResult>
    where
        P: Copy + Send + Sync,
        F: Fn(&[P], &[bool]) -> Result<f64> + Sync,
    {
        check_paired(outcomes.len(), predictions.len())?;
        check_paired(plan.sample_size(), outcomes.len())?;
        self.validate()?;

        // Calculate point estimate from original sample
        let point_estimate = statistic_fn(predictions, outcomes)?;

        let values = self.map_resamples(plan, |indices| {
            let p = gather(predictions, indices);
            let o = gather(outcomes, indices);
            statistic_fn(&p, &o)
        })?;

        self.summarize(point_estimate, values)
    }

    /// Bootstraps one of the four confusion-matrix rates.
    ///
    /// # Errors
    /// See [`Self::estimate`].
    pub fn estimate_rate(
        &self,
        kind: RateKind,
        predictions: &[bool],
        outcomes: &[bool],
    ) -> Result<ConfidenceInterval> {
        self.estimate(rate_statistic(kind), predictions, outcomes)
    }

    /// Evaluates `f` on the indices of every resample in `plan`.
    ///
    /// Resamples where `f` fails with `DegenerateInput` come back as `None`;
    /// any other error aborts. Output order follows resample order.
    ///
    /// # Errors
    /// The first non-degenerate error returned by `f`.
    pub fn map_resamples<F>(&self, plan: &ResamplePlan, f: F) -> Result<Vec<Option<f64>>>
    where
        F: Fn(&[usize]) -> Result<f64> + Sync,
    {
        let eval = |resample: usize| match f(&plan.indices(resample)) {
            Ok(value) => Ok(Some(value)),
            Err(EvaluationError::DegenerateInput(_)) => Ok(None),
            Err(e) => Err(e),
        };

        if self.config.parallel {
            (0..plan.len()).into_par_iter().map(eval).collect()
        } else {
            (0..plan.len()).map(eval).collect()
        }
    }

    /// Turns per-resample values into a [`BootstrapResult`].
    ///
    /// # Errors
    /// `InsufficientData` when the degenerate share exceeds the configured
    /// maximum or no resample is usable.
    pub fn summarize(
        &self,
        point_estimate: f64,
        values: Vec<Option<f64>>,
    ) -> Result<BootstrapResult> {
        let n_resamples = values.len();
        let mut distribution: Vec<f64> = values.into_iter().flatten().collect();
        let n_degenerate = n_resamples - distribution.len();

        let max_fraction = self.config.max_degenerate_fraction;
        if distribution.is_empty() || n_degenerate as f64 > max_fraction * n_resamples as f64 {
            return Err(EvaluationError::InsufficientData {
                degenerate: n_degenerate,
                total: n_resamples,
                max_fraction,
            });
        }

        // Sort for percentile calculation
        distribution.sort_by(f64::total_cmp);

        let (lower, upper) = percentile_ci(&distribution, self.config.confidence_level);

        // Calculate standard error and bias
        let mean: f64 = distribution.iter().sum::<f64>() / distribution.len() as f64;
        let variance: f64 = distribution.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / (distribution.len() - 1).max(1) as f64;
        let standard_error = variance.sqrt();
        let bias = mean - point_estimate;

        debug!(
            n_resamples,
            n_degenerate,
            point_estimate,
            lower,
            upper,
            "Bootstrap estimate complete"
        );

        Ok(BootstrapResult {
            interval: ConfidenceInterval::new(point_estimate, lower, upper),
            standard_error,
            bias,
            n_resamples,
            n_degenerate,
            distribution,
        })
    }
}

/// Statistic computing one confusion-matrix rate from paired vectors.
pub fn rate_statistic(kind: RateKind) -> impl Fn(&[bool], &[bool]) -> Result<f64> + Sync {
    move |predictions, outcomes| ConfusionMatrix::count(predictions, outcomes).rate(kind)
}

/// Copies `values` at `indices`.
pub(crate) fn gather<T: Copy>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i]).collect()
}

/// Linearly interpolated quantile of a sorted slice.
///
/// Returns NaN for an empty slice.
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Extracts the percentile confidence interval from a sorted distribution.
///
/// # Arguments
/// * `distribution` - Sorted vector of bootstrap statistics
/// * `confidence_level` - Desired confidence level (e.g., 0.95)
///
/// # Returns
/// Tuple of (lower_bound, upper_bound)
#[must_use]
pub fn percentile_ci(distribution: &[f64], confidence_level: f64) -> (f64, f64) {
    if distribution.is_empty() {
        return (0.0, 0.0);
    }

    let alpha = 1.0 - confidence_level;
    (
        quantile_sorted(distribution, alpha / 2.0),
        quantile_sorted(distribution, 1.0 - alpha / 2.0),
    )
}
