//! Diagnostic accuracy statistics for binary criteria and continuous scores.
//!
//! - [`confusion`]: confusion-matrix counts and the rates derived from them
//! - [`bootstrap`]: paired percentile bootstrap with explicit random state
//! - [`auroc`]: rank-based AUROC, DeLong variance and paired comparisons
//! - [`adjustment`]: baseline-risk adjustment before AUROC
//! - [`report`]: operating-point report over named predictors
//! - [`auroc_table`]: AUROC table and pairwise comparison matrix

pub mod adjustment;
pub mod auroc;
pub mod auroc_table;
pub mod bootstrap;
pub mod confusion;
pub mod interval;
pub mod report;

pub use adjustment::{fit_logistic, BaselineAdjuster, Covariate, LogisticFit};
pub use auroc::{auroc, delong_variance, AurocComparator, AurocResult, ComparisonResult};
pub use auroc_table::{AurocOptions, AurocRow, AurocTable, ComparisonMatrix, NamedScore};
pub use bootstrap::{
    percentile_ci, BootstrapConfig, BootstrapEstimator, BootstrapResult, ResamplePlan,
};
pub use confusion::{ConfusionMatrix, RateKind};
pub use interval::ConfidenceInterval;
pub use report::{Metric, NamedPredictor, OperatingPointReport, OperatingPointRow, ReportOptions};
