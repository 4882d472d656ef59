use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// Why an in-progress evaluation was aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The caller cancelled the request.
    Cancelled,
    /// A newer request preempted this one.
    Superseded,
}

/// The observation a settled run produces: the representative detection
/// (last frame of the satisfying run) plus a confidence metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettledObservation {
    pub detection: Detection,
    /// Worst pairwise drift between any two frames of the satisfying run.
    /// Zero for a single-frame run. Lower is steadier.
    pub max_drift_observed: f32,
    /// Length of the consistent run that certified settlement.
    pub streak: usize,
}

/// Outcome of evaluating one detection (or one deadline check).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityVerdict {
    /// Not settled yet; carries the current consistency streak and the last
    /// per-step drift (absent until the run is at least two frames long).
    Unsettled {
        streak: usize,
        last_drift: Option<f32>,
    },
    Settled(SettledObservation),
    TimedOut,
    Aborted(AbortReason),
}

impl StabilityVerdict {
    /// True for `Settled`, `TimedOut` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StabilityVerdict::Unsettled { .. })
    }
}

/// Reason codes a failed request reports to its caller.
///
/// Invalid per-request parameters are not represented here: they are
/// rejected synchronously, before a request ever becomes active, with their
/// own error value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No settlement within the request's deadline.
    Timeout,
    /// The upstream detection stream closed or errored mid-evaluation.
    DetectorUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminality() {
        assert!(!StabilityVerdict::Unsettled {
            streak: 2,
            last_drift: Some(0.1)
        }
        .is_terminal());
        assert!(StabilityVerdict::TimedOut.is_terminal());
        assert!(StabilityVerdict::Aborted(AbortReason::Cancelled).is_terminal());
    }
}
