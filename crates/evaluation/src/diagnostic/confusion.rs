//! Confusion matrix for a thresholded predictor against a binary outcome.
//!
//! Derived rates return an error instead of NaN when their denominator is
//! zero; the caller decides how an undefined rate is displayed.

use serde::{Deserialize, Serialize};

use crate::error::{check_paired, EvaluationError, Result};

/// Counts of agreement between binary predictions and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    /// Counts each index into one of the four cells.
    ///
    /// Numeric scores must be thresholded by the caller (e.g. `sofa >= 2`).
    ///
    /// # Errors
    /// `ShapeMismatch` if the lengths differ, `EmptyInput` if both are empty.
    pub fn compute(predictions: &[bool], outcomes: &[bool]) -> Result<Self> {
        check_paired(outcomes.len(), predictions.len())?;
        Ok(Self::count(predictions, outcomes))
    }

    /// Counts without validating lengths; resampled slices are always paired.
    pub(crate) fn count(predictions: &[bool], outcomes: &[bool]) -> Self {
        let mut cm = Self::from_counts(0, 0, 0, 0);
        for (&predicted, &actual) in predictions.iter().zip(outcomes) {
            match (predicted, actual) {
                (true, true) => cm.true_positives += 1,
                (true, false) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_negatives += 1,
            }
        }
        cm
    }

    /// Builds a matrix from published counts.
    #[must_use]
    pub const fn from_counts(
        true_positives: u64,
        false_positives: u64,
        true_negatives: u64,
        false_negatives: u64,
    ) -> Self {
        Self {
            true_positives,
            false_positives,
            true_negatives,
            false_negatives,
        }
    }

    /// Total number of observations.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Observations with a positive outcome (TP + FN).
    #[must_use]
    pub fn positives(&self) -> u64 {
        self.true_positives + self.false_negatives
    }

    /// Observations with a negative outcome (TN + FP).
    #[must_use]
    pub fn negatives(&self) -> u64 {
        self.true_negatives + self.false_positives
    }

    /// Observations predicted positive (TP + FP).
    #[must_use]
    pub fn predicted_positives(&self) -> u64 {
        self.true_positives + self.false_positives
    }

    /// Observations predicted negative (TN + FN).
    #[must_use]
    pub fn predicted_negatives(&self) -> u64 {
        self.true_negatives + self.false_negatives
    }

    /// Outcome prevalence.
    ///
    /// # Errors
    /// `DegenerateInput` for an empty matrix.
    pub fn prevalence(&self) -> Result<f64> {
        ratio(self.positives(), self.total(), "prevalence", "no observations")
    }

    /// TP / (TP + FN).
    ///
    /// # Errors
    /// `DegenerateInput` when no outcome is positive.
    pub fn sensitivity(&self) -> Result<f64> {
        ratio(
            self.true_positives,
            self.positives(),
            "sensitivity",
            "no positive outcomes",
        )
    }

    /// TN / (TN + FP).
    ///
    /// # Errors
    /// `DegenerateInput` when no outcome is negative.
    pub fn specificity(&self) -> Result<f64> {
        ratio(
            self.true_negatives,
            self.negatives(),
            "specificity",
            "no negative outcomes",
        )
    }

    /// TP / (TP + FP).
    ///
    /// # Errors
    /// `DegenerateInput` when nothing is predicted positive.
    pub fn ppv(&self) -> Result<f64> {
        ratio(
            self.true_positives,
            self.predicted_positives(),
            "PPV",
            "no positive predictions",
        )
    }

    /// TN / (TN + FN).
    ///
    /// # Errors
    /// `DegenerateInput` when nothing is predicted negative.
    pub fn npv(&self) -> Result<f64> {
        ratio(
            self.true_negatives,
            self.predicted_negatives(),
            "NPV",
            "no negative predictions",
        )
    }

    /// Harmonic mean of PPV and sensitivity.
    ///
    /// # Errors
    /// `DegenerateInput` when PPV or sensitivity is undefined, or both are zero.
    pub fn f1(&self) -> Result<f64> {
        let ppv = self.ppv()?;
        let sens = self.sensitivity()?;
        if ppv + sens == 0.0 {
            return Err(EvaluationError::undefined("F1", "no true positives"));
        }
        Ok(2.0 * ppv * sens / (ppv + sens))
    }

    /// True positives per 100 outcome-positive patients (100 x sensitivity).
    ///
    /// # Errors
    /// `DegenerateInput` when no outcome is positive.
    pub fn ntp_per_100(&self) -> Result<f64> {
        ratio(
            self.true_positives,
            self.positives(),
            "NTP/100",
            "no positive outcomes",
        )
        .map(|r| 100.0 * r)
    }

    /// False positives per 100 outcome-positive patients, 100 x FP / (TP + FN).
    ///
    /// # Errors
    /// `DegenerateInput` when no outcome is positive.
    pub fn nfp_per_100(&self) -> Result<f64> {
        ratio(
            self.false_positives,
            self.positives(),
            "NFP/100",
            "no positive outcomes",
        )
        .map(|r| 100.0 * r)
    }

    /// Looks up a rate by kind.
    ///
    /// # Errors
    /// Propagates the rate's `DegenerateInput`.
    pub fn rate(&self, kind: RateKind) -> Result<f64> {
        match kind {
            RateKind::Sensitivity => self.sensitivity(),
            RateKind::Specificity => self.specificity(),
            RateKind::Ppv => self.ppv(),
            RateKind::Npv => self.npv(),
        }
    }
}

/// The four proportion-type rates reported with confidence intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateKind {
    Sensitivity,
    Specificity,
    Ppv,
    Npv,
}

impl RateKind {
    pub const ALL: [RateKind; 4] = [
        RateKind::Sensitivity,
        RateKind::Specificity,
        RateKind::Ppv,
        RateKind::Npv,
    ];

    /// Numerator and denominator counts of the rate.
    #[must_use]
    pub fn counts(self, cm: &ConfusionMatrix) -> (u64, u64) {
        match self {
            Self::Sensitivity => (cm.true_positives, cm.positives()),
            Self::Specificity => (cm.true_negatives, cm.negatives()),
            Self::Ppv => (cm.true_positives, cm.predicted_positives()),
            Self::Npv => (cm.true_negatives, cm.predicted_negatives()),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sensitivity => "Sens",
            Self::Specificity => "Spec",
            Self::Ppv => "PPV",
            Self::Npv => "NPV",
        }
    }
}

fn ratio(numerator: u64, denominator: u64, metric: &str, why: &str) -> Result<f64> {
    if denominator == 0 {
        return Err(EvaluationError::undefined(metric, why));
    }
    Ok(numerator as f64 / denominator as f64)
}
