//! Evaluation of sepsis criteria against a reference-standard outcome.
//!
//! Pure computation over in-memory vectors: callers load the cohort and
//! apply predictor rules (see `sepsis3-core`), then hand aligned prediction,
//! score and outcome vectors to the types in [`diagnostic`].

pub mod diagnostic;
pub mod error;

pub use diagnostic::{
    auroc, AurocComparator, AurocOptions, AurocResult, AurocTable, BaselineAdjuster,
    BootstrapConfig, BootstrapEstimator, ComparisonResult, ConfidenceInterval, ConfusionMatrix,
    Covariate, Metric, NamedPredictor, NamedScore, OperatingPointReport, RateKind, ReportOptions,
    ResamplePlan,
};
pub use error::{EvaluationError, Result};
