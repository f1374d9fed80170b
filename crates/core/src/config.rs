use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cohort: CohortConfig,
    pub bootstrap: BootstrapConfig,
    pub evaluation: EvaluationConfig,
    pub predictors: Vec<PredictorConfig>,
    pub scores: Vec<ScoreConfig>,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Cohort CSV exported by the extraction query.
    pub path: Option<String>,
    /// Reference-standard outcome column.
    pub outcome: String,
    /// Patient-stay identifier column, used only for logging duplicates.
    pub id_column: Option<String>,
}

/// Configuration for bootstrap resampling.
///
/// Without a `seed` the resampler draws one from OS entropy, so intervals
/// differ between runs. The drawn seed is logged at debug level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of bootstrap resamples.
    pub n_resamples: usize,
    /// Confidence level for the interval (e.g., 0.95 for 95% CI).
    pub confidence_level: f64,
    /// Optional seed for reproducible results.
    pub seed: Option<u64>,
    /// Largest share of degenerate resamples tolerated before the estimate fails.
    pub max_degenerate_fraction: f64,
    /// Evaluate resamples on the rayon thread pool.
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub proportion_interval: ProportionIntervalMethod,
    pub auroc_interval: AurocIntervalMethod,
    pub comparison: ComparisonMethod,
    pub adjustment: AurocAdjustment,
    pub failure_policy: FailurePolicy,
    /// Baseline covariate columns for adjusted AUROC.
    pub covariates: Vec<String>,
}

/// A named threshold rule, e.g. `name = "SOFA"`, `rule = "sofa >= 2"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictorConfig {
    pub name: String,
    pub rule: String,
}

/// A named continuous score column used for AUROC analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreConfig {
    pub name: String,
    pub column: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub path: Option<String>,
}

/// Interval used for sensitivity, specificity, PPV and NPV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProportionIntervalMethod {
    /// Percentile bootstrap over paired resamples.
    #[default]
    Bootstrap,
    /// Analytic Wilson score interval.
    Wilson,
}

/// Interval used for a single AUROC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AurocIntervalMethod {
    /// Normal interval from the DeLong variance estimate.
    #[default]
    #[serde(rename = "delong")]
    DeLong,
    /// Percentile bootstrap.
    Bootstrap,
}

/// Paired test for the difference between two AUROCs on the same outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMethod {
    /// DeLong, DeLong & Clarke-Pearson covariance of correlated U-statistics.
    #[default]
    #[serde(rename = "delong")]
    DeLong,
    /// Both scores evaluated on shared bootstrap resample indices.
    PairedBootstrap,
}

/// How a score is combined with baseline risk before computing AUROC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AurocAdjustment {
    /// Raw score.
    #[default]
    None,
    /// Logistic regression on baseline covariates plus the score.
    BaselineRegression,
    /// As `BaselineRegression`, with FP1 transforms of continuous covariates.
    FractionalPolynomial,
}

/// What a report does when one row or comparison cannot be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep going and render the failed cells as undefined.
    #[default]
    Placeholder,
    /// Fail the whole report.
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
    Json,
}

/// Error returned when a configuration enum cannot be parsed from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: '{value}'. Valid values: {valid}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    valid: &'static str,
}

macro_rules! kebab_enum {
    ($ty:ident, $kind:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().replace('_', "-").as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                        valid: concat!($($text, " "),+),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $(Self::$variant => $text,)+
                };
                f.write_str(text)
            }
        }
    };
}

kebab_enum!(ProportionIntervalMethod, "proportion interval", {
    "bootstrap" => Bootstrap,
    "wilson" => Wilson,
});
kebab_enum!(AurocIntervalMethod, "AUROC interval", {
    "delong" => DeLong,
    "bootstrap" => Bootstrap,
});
kebab_enum!(ComparisonMethod, "comparison method", {
    "delong" => DeLong,
    "paired-bootstrap" => PairedBootstrap,
});
kebab_enum!(AurocAdjustment, "adjustment", {
    "none" => None,
    "baseline-regression" => BaselineRegression,
    "fractional-polynomial" => FractionalPolynomial,
});
kebab_enum!(FailurePolicy, "failure policy", {
    "placeholder" => Placeholder,
    "abort" => Abort,
});
kebab_enum!(OutputFormat, "format", {
    "text" => Text,
    "csv" => Csv,
    "json" => Json,
});

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            path: None,
            outcome: "angus".to_string(),
            id_column: Some("icustay_id".to_string()),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 1_000,
            confidence_level: 0.95,
            seed: None,
            max_degenerate_fraction: 0.5,
            parallel: true,
        }
    }
}

impl BootstrapConfig {
    /// Creates a new configuration with specified parameters.
    #[must_use]
    pub fn new(n_resamples: usize, confidence_level: f64) -> Self {
        Self {
            n_resamples,
            confidence_level,
            ..Self::default()
        }
    }

    /// Sets a seed for reproducible bootstrap samples.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the tolerated share of degenerate resamples.
    #[must_use]
    pub fn with_max_degenerate_fraction(mut self, fraction: f64) -> Self {
        self.max_degenerate_fraction = fraction;
        self
    }

    /// Enables or disables the rayon resample loop.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            proportion_interval: ProportionIntervalMethod::default(),
            auroc_interval: AurocIntervalMethod::default(),
            comparison: ComparisonMethod::default(),
            adjustment: AurocAdjustment::default(),
            failure_policy: FailurePolicy::default(),
            covariates: [
                "age",
                "is_male",
                "race_black",
                "race_other",
                "elixhauser_hospital",
            ]
            .iter()
            .map(|c| (*c).to_string())
            .collect(),
        }
    }
}

impl AppConfig {
    /// Predictors reported when the configuration names none, listed with
    /// the less specific scores first and the composite definition last.
    #[must_use]
    pub fn default_predictors() -> Vec<PredictorConfig> {
        [
            ("SIRS", "sirs >= 2"),
            ("qSOFA", "qsofa >= 2"),
            ("SOFA", "sofa >= 2"),
            ("Sepsis-3", "sepsis3"),
        ]
        .iter()
        .map(|(name, rule)| PredictorConfig {
            name: (*name).to_string(),
            rule: (*rule).to_string(),
        })
        .collect()
    }

    /// Scores compared by AUROC when the configuration names none.
    #[must_use]
    pub fn default_scores() -> Vec<ScoreConfig> {
        [
            ("SIRS", "sirs"),
            ("qSOFA", "qsofa"),
            ("SOFA", "sofa"),
            ("mLODS", "mlods"),
        ]
        .iter()
        .map(|(name, column)| ScoreConfig {
            name: (*name).to_string(),
            column: (*column).to_string(),
        })
        .collect()
    }

    /// Configured predictors, falling back to [`Self::default_predictors`].
    #[must_use]
    pub fn predictors_or_default(&self) -> Vec<PredictorConfig> {
        if self.predictors.is_empty() {
            Self::default_predictors()
        } else {
            self.predictors.clone()
        }
    }

    /// Configured scores, falling back to [`Self::default_scores`].
    #[must_use]
    pub fn scores_or_default(&self) -> Vec<ScoreConfig> {
        if self.scores.is_empty() {
            Self::default_scores()
        } else {
            self.scores.clone()
        }
    }
}
