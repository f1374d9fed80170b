use serde::{Deserialize, Serialize};

/// Point estimate with a two-sided interval, `lower <= point_estimate <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub point_estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Builds an interval, widening the bounds to contain the point estimate.
    ///
    /// Percentile bootstrap bounds can exclude the point estimate when the
    /// resampling distribution is skewed or lumpy.
    #[must_use]
    pub fn new(point_estimate: f64, lower: f64, upper: f64) -> Self {
        let (lower, upper) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        Self {
            point_estimate,
            lower: lower.min(point_estimate),
            upper: upper.max(point_estimate),
        }
    }

    /// Interval of width zero.
    #[must_use]
    pub fn exact(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Clamps all three values to `[0, 1]`.
    #[must_use]
    pub fn clamp_unit(self) -> Self {
        Self::new(
            self.point_estimate.clamp(0.0, 1.0),
            self.lower.clamp(0.0, 1.0),
            self.upper.clamp(0.0, 1.0),
        )
    }

    /// Applies `f` to all three values (monotone increasing `f` only).
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.point_estimate), f(self.lower), f(self.upper))
    }

    /// Returns the width of the confidence interval.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_keeps_ordered_bounds() {
        let ci = ConfidenceInterval::new(0.55, 0.50, 0.60);
        assert!((ci.width() - 0.10).abs() < 1e-12);
        assert!(ci.contains(0.55));
    }

    #[test]
    fn new_widens_to_contain_point() {
        let ci = ConfidenceInterval::new(0.70, 0.50, 0.60);
        assert!((ci.upper - 0.70).abs() < f64::EPSILON);
        assert!((ci.lower - 0.50).abs() < f64::EPSILON);
    }

    #[test]
    fn new_swaps_reversed_bounds() {
        let ci = ConfidenceInterval::new(0.55, 0.60, 0.50);
        assert!(ci.lower <= ci.point_estimate && ci.point_estimate <= ci.upper);
    }

    #[test]
    fn clamp_unit_bounds_proportions() {
        let ci = ConfidenceInterval::new(0.98, 0.95, 1.02).clamp_unit();
        assert!((ci.upper - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn map_scales_all_values() {
        let ci = ConfidenceInterval::new(0.5, 0.4, 0.6).map(|v| v * 100.0);
        assert!((ci.point_estimate - 50.0).abs() < 1e-9);
        assert!((ci.lower - 40.0).abs() < 1e-9);
        assert!((ci.upper - 60.0).abs() < 1e-9);
    }
}
