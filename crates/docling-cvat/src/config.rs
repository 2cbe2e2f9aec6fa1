//! Tunables shared by every pipeline stage.

use crate::error::{CvatError, Result};
use serde::{Deserialize, Serialize};

/// Default fraction of a child's area that must lie inside its parent.
pub const DEFAULT_CONTAINMENT_THRESHOLD: f64 = 0.7;

/// Default slack (in pixels) when testing whether a control point hits a box.
pub const DEFAULT_POINT_TOLERANCE: f64 = 5.0;

/// Configuration for annotation conversion
///
/// Every stage receives a copy of this struct at construction time and reads
/// its thresholds from here only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Fraction of an element's area that must lie inside a candidate parent
    /// (strictly greater than) for the candidate to qualify.
    pub containment_threshold: f64,
    /// Pixel tolerance applied on every side of a box when testing whether a
    /// path control point touches it.
    pub point_tolerance: f64,
    /// Fan per-path work out over the rayon thread pool.
    ///
    /// Results are always collected in input order, so this never changes
    /// the output.
    pub parallel: bool,
}

impl Default for ConversionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            containment_threshold: DEFAULT_CONTAINMENT_THRESHOLD,
            point_tolerance: DEFAULT_POINT_TOLERANCE,
            parallel: true,
        }
    }
}

impl ConversionConfig {
    /// Set the containment threshold
    #[inline]
    #[must_use = "returns the updated config"]
    pub fn with_containment_threshold(mut self, threshold: f64) -> Self {
        self.containment_threshold = threshold;
        self
    }

    /// Set the control-point tolerance in pixels
    #[inline]
    #[must_use = "returns the updated config"]
    pub fn with_point_tolerance(mut self, tolerance: f64) -> Self {
        self.point_tolerance = tolerance;
        self
    }

    /// Enable or disable rayon fan-out
    #[inline]
    #[must_use = "returns the updated config"]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check that every tunable is in range.
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::InvalidConfig`] if the containment threshold is
    /// not in `(0, 1]` or the tolerance is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.containment_threshold > 0.0 && self.containment_threshold <= 1.0) {
            return Err(CvatError::InvalidConfig {
                reason: format!(
                    "containment_threshold must be in (0, 1], got {}",
                    self.containment_threshold
                ),
            });
        }
        if !self.point_tolerance.is_finite() || self.point_tolerance < 0.0 {
            return Err(CvatError::InvalidConfig {
                reason: format!(
                    "point_tolerance must be a finite, non-negative pixel count, got {}",
                    self.point_tolerance
                ),
            });
        }
        Ok(())
    }
}
