use thiserror::Error;

/// Errors from the statistics core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Paired vectors differ in length.
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// No observations.
    #[error("Empty input")]
    EmptyInput,

    /// A rate's denominator is zero, or an AUROC lacks one of the classes.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Too many bootstrap resamples produced an undefined statistic.
    #[error(
        "Insufficient data: {degenerate} of {total} resamples were degenerate \
         (max fraction {max_fraction})"
    )]
    InsufficientData {
        degenerate: usize,
        total: usize,
        max_fraction: f64,
    },

    /// A score is NaN or infinite.
    #[error("Non-finite value at index {index}")]
    NonFiniteValue { index: usize },

    /// A configuration value is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Baseline regression did not converge.
    #[error("Logistic regression did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
}

impl EvaluationError {
    /// Degenerate input error naming the undefined metric.
    pub(crate) fn undefined(metric: &str, why: &str) -> Self {
        Self::DegenerateInput(format!("{metric} is undefined ({why})"))
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Checks that two paired vectors are non-empty and of equal length.
pub(crate) fn check_paired(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(EvaluationError::ShapeMismatch { expected, actual });
    }
    if expected == 0 {
        return Err(EvaluationError::EmptyInput);
    }
    Ok(())
}
