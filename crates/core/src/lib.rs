pub mod cohort;
pub mod config;
pub mod config_loader;
pub mod rules;
pub mod validation;

pub use cohort::{CohortError, CohortTable};
pub use config::{
    AppConfig, AurocAdjustment, AurocIntervalMethod, BootstrapConfig, CohortConfig,
    ComparisonMethod, EvaluationConfig, FailurePolicy, OutputConfig, OutputFormat,
    PredictorConfig, ProportionIntervalMethod, ScoreConfig,
};
pub use config_loader::ConfigLoader;
pub use rules::{Comparison, PredictorRule, RuleKind};
pub use validation::{
    standard_normal_cdf, standard_normal_quantile, two_sided_p_value, wilson_ci,
    z_for_confidence,
};
