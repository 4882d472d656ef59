use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-request settling parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettleParams {
    /// Wall-clock deadline for reaching settlement, measured from request
    /// acceptance.
    pub max_wait: Duration,

    /// Number of consecutive consistent detections required to certify
    /// settlement.
    pub min_consistent_count: usize,

    /// Maximum drift (max per-point displacement between corresponding
    /// points) tolerated between *any* two detections of a consistent run,
    /// in the detection's native units. Bounds the run's total motion, not
    /// just frame-to-frame steps.
    pub max_drift: f32,

    /// Maximum age of a retained detection relative to the newest one.
    /// Older frames are evicted from the settling window.
    pub max_age: Duration,

    /// Maximum number of detections the settling window retains.
    pub window_capacity: usize,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            min_consistent_count: 5,
            max_drift: 1.0,
            max_age: Duration::from_secs(2),
            window_capacity: 32,
        }
    }
}

/// Per-request parameter validation errors. Reject the offending request
/// only; the coordinator stays usable.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SettleParamsError {
    #[error("max_drift must be finite and positive (got {max_drift})")]
    BadDrift { max_drift: f32 },
    #[error("min_consistent_count must be at least 1")]
    ZeroConsistentCount,
    #[error("min_consistent_count ({count}) exceeds window capacity ({capacity})")]
    CountExceedsWindow { count: usize, capacity: usize },
    #[error("window capacity must be at least 1")]
    ZeroWindowCapacity,
    #[error("max_wait must be positive")]
    ZeroMaxWait,
    #[error("max_age must be positive")]
    ZeroMaxAge,
}

impl SettleParams {
    /// Fail-fast validation, run before any detection is evaluated.
    pub fn validate(&self) -> Result<(), SettleParamsError> {
        if !self.max_drift.is_finite() || self.max_drift <= 0.0 {
            return Err(SettleParamsError::BadDrift {
                max_drift: self.max_drift,
            });
        }
        if self.window_capacity == 0 {
            return Err(SettleParamsError::ZeroWindowCapacity);
        }
        if self.min_consistent_count == 0 {
            return Err(SettleParamsError::ZeroConsistentCount);
        }
        if self.min_consistent_count > self.window_capacity {
            return Err(SettleParamsError::CountExceedsWindow {
                count: self.min_consistent_count,
                capacity: self.window_capacity,
            });
        }
        if self.max_wait.is_zero() {
            return Err(SettleParamsError::ZeroMaxWait);
        }
        if self.max_age.is_zero() {
            return Err(SettleParamsError::ZeroMaxAge);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SettleParams::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_drift() {
        let mut p = SettleParams::default();
        p.max_drift = 0.0;
        assert_eq!(
            p.validate(),
            Err(SettleParamsError::BadDrift { max_drift: 0.0 })
        );
        p.max_drift = f32::INFINITY;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_zero_consistent_count() {
        let mut p = SettleParams::default();
        p.min_consistent_count = 0;
        assert_eq!(p.validate(), Err(SettleParamsError::ZeroConsistentCount));
    }

    #[test]
    fn rejects_count_beyond_window_capacity() {
        let mut p = SettleParams::default();
        p.window_capacity = 4;
        p.min_consistent_count = 5;
        assert_eq!(
            p.validate(),
            Err(SettleParamsError::CountExceedsWindow {
                count: 5,
                capacity: 4
            })
        );
    }

    #[test]
    fn rejects_zero_durations() {
        let mut p = SettleParams::default();
        p.max_wait = Duration::ZERO;
        assert_eq!(p.validate(), Err(SettleParamsError::ZeroMaxWait));

        let mut p = SettleParams::default();
        p.max_age = Duration::ZERO;
        assert_eq!(p.validate(), Err(SettleParamsError::ZeroMaxAge));
    }
}
