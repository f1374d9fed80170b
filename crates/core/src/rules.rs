//! Threshold rules turning cohort columns into binary predictions.
//!
//! A rule is either a comparison of a numeric column against a constant
//! (`sofa >= 2`) or a bare column name read as a boolean flag (`sepsis3`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cohort::{CohortError, CohortTable};

/// Comparison operator of a threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
}

impl Comparison {
    /// Operators in parse order; two-character operators come first.
    const ALL: [Comparison; 6] = [
        Comparison::Ge,
        Comparison::Le,
        Comparison::Eq,
        Comparison::Ne,
        Comparison::Gt,
        Comparison::Lt,
    ];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Applies `value <op> threshold`.
    #[must_use]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Ge => value >= threshold,
            Self::Gt => value > threshold,
            Self::Le => value <= threshold,
            Self::Lt => value < threshold,
            #[allow(clippy::float_cmp)]
            Self::Eq => value == threshold,
            #[allow(clippy::float_cmp)]
            Self::Ne => value != threshold,
        }
    }
}

/// Right-hand side of a predictor rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Numeric column compared against a constant.
    Threshold {
        comparison: Comparison,
        threshold: f64,
    },
    /// Boolean column taken as is.
    Flag,
}

/// A named binary predictor derived from one cohort column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorRule {
    pub name: String,
    pub column: String,
    pub kind: RuleKind,
}

impl PredictorRule {
    /// Creates a threshold rule.
    #[must_use]
    pub fn threshold(name: &str, column: &str, comparison: Comparison, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            kind: RuleKind::Threshold {
                comparison,
                threshold,
            },
        }
    }

    /// Creates a boolean flag rule.
    #[must_use]
    pub fn flag(name: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            kind: RuleKind::Flag,
        }
    }

    /// Parses `expression` (`"sofa >= 2"` or `"sepsis3"`) under `name`.
    ///
    /// # Errors
    /// Returns [`CohortError::InvalidRule`] for an empty column, an empty or
    /// non-numeric threshold.
    pub fn parse(name: &str, expression: &str) -> Result<Self, CohortError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(CohortError::InvalidRule("empty rule".to_string()));
        }

        for comparison in Comparison::ALL {
            let Some(pos) = expression.find(comparison.symbol()) else {
                continue;
            };
            let column = expression[..pos].trim();
            let rhs = expression[pos + comparison.symbol().len()..].trim();
            if column.is_empty() {
                return Err(CohortError::InvalidRule(format!(
                    "missing column in '{expression}'"
                )));
            }
            let threshold: f64 = rhs.parse().map_err(|_| {
                CohortError::InvalidRule(format!("threshold '{rhs}' in '{expression}' is not a number"))
            })?;
            if !threshold.is_finite() {
                return Err(CohortError::InvalidRule(format!(
                    "threshold '{rhs}' in '{expression}' is not finite"
                )));
            }
            return Ok(Self::threshold(name, column, comparison, threshold));
        }

        if expression.contains(char::is_whitespace) || expression.contains(['<', '>', '=', '!']) {
            return Err(CohortError::InvalidRule(format!(
                "cannot parse '{expression}'"
            )));
        }
        Ok(Self::flag(name, expression))
    }

    /// Parses a command-line style `NAME=EXPRESSION`. Without a name part
    /// the expression doubles as the name (`"sofa>=2"`).
    ///
    /// # Errors
    /// Returns [`CohortError::InvalidRule`] if the expression is invalid.
    pub fn parse_named(spec: &str) -> Result<Self, CohortError> {
        match split_name(spec) {
            Some((name, expression)) if !name.trim().is_empty() => {
                Self::parse(name.trim(), expression)
            }
            Some(_) => Err(CohortError::InvalidRule(format!("empty name in '{spec}'"))),
            None => Self::parse(spec.trim(), spec),
        }
    }

    /// Evaluates the rule on every row of `table`.
    ///
    /// # Errors
    /// Returns an error if the column is absent or holds missing/invalid values.
    pub fn apply(&self, table: &CohortTable) -> Result<Vec<bool>, CohortError> {
        match self.kind {
            RuleKind::Flag => table.boolean_column(&self.column),
            RuleKind::Threshold {
                comparison,
                threshold,
            } => Ok(table
                .numeric_column(&self.column)?
                .into_iter()
                .map(|v| comparison.holds(v, threshold))
                .collect()),
        }
    }
}

impl fmt::Display for PredictorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RuleKind::Flag => write!(f, "{}", self.column),
            RuleKind::Threshold {
                comparison,
                threshold,
            } => write!(f, "{} {} {}", self.column, comparison.symbol(), threshold),
        }
    }
}

impl FromStr for PredictorRule {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_named(s)
    }
}

/// Finds the `=` separating a name from its expression, skipping the `=`
/// inside `>=`, `<=`, `==` and `!=`.
fn split_name(spec: &str) -> Option<(&str, &str)> {
    let bytes = spec.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 1).copied();
        let part_of_operator =
            matches!(prev, Some(b'<' | b'>' | b'=' | b'!')) || next == Some(b'=');
        if !part_of_operator {
            return Some((&spec[..i], &spec[i + 1..]));
        }
    }
    None
}
