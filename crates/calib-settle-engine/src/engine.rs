use std::time::Instant;

use log::{debug, info, warn};

use calib_settle_core::{
    step_drift, AbortReason, Detection, GridGeometry, SettleParams, SettleParamsError,
    SettledObservation, StabilityVerdict,
};

use crate::window::SettlingWindow;

/// Decides when a detection stream has settled.
///
/// One engine instance serves one settle request. `feed` evaluates one
/// incoming detection; `check_deadline` covers the case where the source
/// goes idle and no further detections arrive. Once a terminal verdict is
/// produced the engine is finished and every further call returns that same
/// verdict.
///
/// The `_at` variants take an explicit `Instant` so callers (and tests) can
/// drive the wall clock deterministically; the plain variants use
/// `Instant::now()`.
#[derive(Debug)]
pub struct SettlingEngine {
    geometry: GridGeometry,
    params: SettleParams,
    window: SettlingWindow,
    streak: usize,
    run_max_drift: f32,
    last_drift: Option<f32>,
    deadline: Instant,
    finished: Option<StabilityVerdict>,
}

impl SettlingEngine {
    /// Start an evaluation. Validates the per-request parameters and arms
    /// the wall-clock deadline; the grid geometry is validated once at
    /// coordinator construction.
    pub fn start(geometry: GridGeometry, params: SettleParams) -> Result<Self, SettleParamsError> {
        Self::start_at(geometry, params, Instant::now())
    }

    pub fn start_at(
        geometry: GridGeometry,
        params: SettleParams,
        now: Instant,
    ) -> Result<Self, SettleParamsError> {
        params.validate()?;
        let window = SettlingWindow::new(params.max_age, params.window_capacity);
        let deadline = now + params.max_wait;
        debug!(
            "settling started: {} consistent frames within {:?}, drift <= {}",
            params.min_consistent_count, params.max_wait, params.max_drift
        );
        Ok(Self {
            geometry,
            params,
            window,
            streak: 0,
            run_max_drift: 0.0,
            last_drift: None,
            deadline,
            finished: None,
        })
    }

    /// Evaluate one incoming detection.
    pub fn feed(&mut self, detection: &Detection) -> StabilityVerdict {
        self.feed_at(detection, Instant::now())
    }

    pub fn feed_at(&mut self, detection: &Detection, now: Instant) -> StabilityVerdict {
        if let Some(verdict) = &self.finished {
            return verdict.clone();
        }
        if now >= self.deadline {
            return self.finish(StabilityVerdict::TimedOut);
        }

        if detection.is_empty() {
            // A missed frame breaks the run but keeps the window intact.
            self.reset_streak();
            debug!("empty frame {}: streak reset", detection.frame_id);
            return self.unsettled();
        }

        let expected = self.geometry.expected_points();
        if detection.points.len() != expected {
            warn!(
                "frame {}: {} points, expected {}; streak reset",
                detection.frame_id,
                detection.points.len(),
                expected
            );
            self.reset_streak();
            return self.unsettled();
        }

        if let Some(prev) = self.window.latest() {
            if detection.stamp <= prev.stamp {
                warn!(
                    "frame {}: stamp {:?} not after {:?}; frame dropped",
                    detection.frame_id, detection.stamp, prev.stamp
                );
                self.reset_streak();
                return self.unsettled();
            }
        }

        // The new frame extends the run only while it stays within
        // `max_drift` of *every* retained run frame. The run frames are
        // already pairwise drift-bounded, so checking the new frame against
        // each of them keeps the whole run pairwise bounded: a board
        // creeping a little per frame breaks the run once it has moved too
        // far from the run's older frames.
        let mut kept = 0usize;
        let mut last_step = None;
        for prev in self.window.iter().rev().take(self.streak) {
            match step_drift(&prev.points, &detection.points) {
                Some(d) => {
                    if kept == 0 {
                        last_step = Some(d);
                    }
                    if d > self.params.max_drift {
                        break;
                    }
                    kept += 1;
                }
                None => break,
            }
        }

        // Stamp monotonicity was checked above, so push cannot fail.
        let evicted = self.window.push(detection.clone()).unwrap_or_default();
        self.streak = kept + 1;
        self.last_drift = last_step;

        // Never certify settlement over frames the window no longer holds.
        if evicted > 0 && self.streak > self.window.len() {
            self.streak = self.window.len();
        }

        self.run_max_drift = self.run_pairwise_drift();

        if self.streak >= self.params.min_consistent_count {
            let representative = match self.window.latest() {
                Some(frame) => frame.clone(),
                None => detection.clone(),
            };
            info!(
                "settled on frame {} after {} consistent frames (max drift {:.3})",
                representative.frame_id, self.streak, self.run_max_drift
            );
            let observation = SettledObservation {
                detection: representative,
                max_drift_observed: self.run_max_drift,
                streak: self.streak,
            };
            return self.finish(StabilityVerdict::Settled(observation));
        }

        self.unsettled()
    }

    /// Deadline check for idle sources. Returns the terminal verdict when the
    /// deadline has passed, `None` while the evaluation may still settle.
    pub fn check_deadline(&mut self) -> Option<StabilityVerdict> {
        self.check_deadline_at(Instant::now())
    }

    pub fn check_deadline_at(&mut self, now: Instant) -> Option<StabilityVerdict> {
        if let Some(verdict) = &self.finished {
            return Some(verdict.clone());
        }
        if now >= self.deadline {
            info!("settling timed out");
            return Some(self.finish(StabilityVerdict::TimedOut));
        }
        None
    }

    /// Abort the evaluation and release the window. Idempotent: a finished
    /// engine keeps its original verdict.
    pub fn abort(&mut self, reason: AbortReason) -> StabilityVerdict {
        if let Some(verdict) = &self.finished {
            return verdict.clone();
        }
        self.window.clear();
        self.finish(StabilityVerdict::Aborted(reason))
    }

    /// `abort(Cancelled)`.
    pub fn cancel(&mut self) -> StabilityVerdict {
        self.abort(AbortReason::Cancelled)
    }

    /// Current consistency streak length.
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// Per-step drift of the most recent evaluated frame, if any.
    pub fn last_drift(&self) -> Option<f32> {
        self.last_drift
    }

    /// Terminal verdict, once produced.
    pub fn verdict(&self) -> Option<&StabilityVerdict> {
        self.finished.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Max pairwise drift between any two frames of the current run (the
    /// trailing `streak` window entries). This is the confidence figure a
    /// settled observation carries.
    fn run_pairwise_drift(&self) -> f32 {
        let run: Vec<&Detection> = self.window.iter().rev().take(self.streak).collect();
        let mut worst = 0.0f32;
        for (i, a) in run.iter().enumerate() {
            for b in run.iter().skip(i + 1) {
                if let Some(d) = step_drift(&a.points, &b.points) {
                    if d > worst {
                        worst = d;
                    }
                }
            }
        }
        worst
    }

    fn reset_streak(&mut self) {
        self.streak = 0;
        self.run_max_drift = 0.0;
        self.last_drift = None;
    }

    fn unsettled(&self) -> StabilityVerdict {
        StabilityVerdict::Unsettled {
            streak: self.streak,
            last_drift: self.last_drift,
        }
    }

    fn finish(&mut self, verdict: StabilityVerdict) -> StabilityVerdict {
        self.finished = Some(verdict.clone());
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use calib_settle_core::SourceInfo;
    use nalgebra::Point2;
    use std::time::Duration;

    fn geometry() -> GridGeometry {
        GridGeometry::new(6, 8, 0.025).unwrap()
    }

    fn params(count: usize, max_drift: f32) -> SettleParams {
        SettleParams {
            max_wait: Duration::from_secs(2),
            min_consistent_count: count,
            max_drift,
            ..SettleParams::default()
        }
    }

    fn grid(offset: f32) -> Vec<Point2<f32>> {
        (0..6)
            .flat_map(|r| (0..8).map(move |c| Point2::new(c as f32 + offset, r as f32)))
            .collect()
    }

    fn frame(ms: u64, offset: f32) -> Detection {
        Detection {
            stamp: Duration::from_millis(ms),
            frame_id: format!("f{ms}"),
            points: grid(offset),
            source: SourceInfo::pixels("cam0"),
        }
    }

    fn empty(ms: u64) -> Detection {
        Detection::empty(
            Duration::from_millis(ms),
            format!("f{ms}"),
            SourceInfo::pixels("cam0"),
        )
    }

    #[test]
    fn settles_exactly_on_the_completing_frame() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();

        let v1 = engine.feed_at(&frame(0, 0.0), t0);
        assert_eq!(
            v1,
            StabilityVerdict::Unsettled {
                streak: 1,
                last_drift: None
            }
        );
        let v2 = engine.feed_at(&frame(33, 0.1), t0);
        assert!(matches!(v2, StabilityVerdict::Unsettled { streak: 2, .. }));

        match engine.feed_at(&frame(66, 0.2), t0) {
            StabilityVerdict::Settled(obs) => {
                assert_eq!(obs.streak, 3);
                assert_eq!(obs.detection.frame_id, "f66");
                // Pairwise over the run: the 0.0 and 0.2 frames are the
                // farthest apart.
                assert_relative_eq!(obs.max_drift_observed, 0.2, epsilon = 1e-5);
            }
            other => panic!("expected Settled, got {other:?}"),
        }
    }

    #[test]
    fn empty_frame_resets_streak_then_settles_after_full_run() {
        // Two good frames, one missed frame, then three good frames.
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();

        engine.feed_at(&frame(0, 0.0), t0);
        engine.feed_at(&frame(33, 0.1), t0);
        let v = engine.feed_at(&empty(66), t0);
        assert_eq!(
            v,
            StabilityVerdict::Unsettled {
                streak: 0,
                last_drift: None
            }
        );

        let v = engine.feed_at(&frame(99, 0.15), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 1, .. }));
        let v = engine.feed_at(&frame(132, 0.2), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 2, .. }));
        let v = engine.feed_at(&frame(165, 0.3), t0);
        assert!(matches!(v, StabilityVerdict::Settled(_)));
    }

    #[test]
    fn point_count_mismatch_never_certifies() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(2, 0.5), t0).unwrap();

        engine.feed_at(&frame(0, 0.0), t0);
        let mut partial = frame(33, 0.05);
        partial.points.truncate(40);
        let v = engine.feed_at(&partial, t0);
        assert_eq!(
            v,
            StabilityVerdict::Unsettled {
                streak: 0,
                last_drift: None
            }
        );
    }

    #[test]
    fn creeping_board_never_settles_while_it_keeps_moving() {
        // Each step moves 0.4 px, under the 0.5 px bound, but the board
        // keeps creeping: across any 3-frame run the corresponding points
        // move 0.8 px, so settlement must not be certified until the board
        // actually holds still.
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();

        engine.feed_at(&frame(0, 0.0), t0);
        let v = engine.feed_at(&frame(33, 0.4), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 2, .. }));
        let v = engine.feed_at(&frame(66, 0.8), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 2, .. }));
        let v = engine.feed_at(&frame(99, 1.2), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 2, .. }));

        // The board stops; the trailing three frames stay within the bound
        // of each other and settlement lands there.
        let v = engine.feed_at(&frame(132, 1.35), t0);
        assert!(matches!(v, StabilityVerdict::Unsettled { streak: 2, .. }));
        match engine.feed_at(&frame(165, 1.35), t0) {
            StabilityVerdict::Settled(obs) => {
                assert_eq!(obs.streak, 3);
                assert_eq!(obs.detection.frame_id, "f165");
                assert_relative_eq!(obs.max_drift_observed, 0.15, epsilon = 1e-5);
            }
            other => panic!("expected Settled, got {other:?}"),
        }
    }

    #[test]
    fn excessive_drift_starts_a_fresh_run() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();

        engine.feed_at(&frame(0, 0.0), t0);
        engine.feed_at(&frame(33, 0.1), t0);
        // Big jump: run restarts at this frame, not at zero.
        let v = engine.feed_at(&frame(66, 5.0), t0);
        match v {
            StabilityVerdict::Unsettled { streak, last_drift } => {
                assert_eq!(streak, 1);
                assert_relative_eq!(last_drift.unwrap(), 4.9, epsilon = 1e-4);
            }
            other => panic!("expected Unsettled, got {other:?}"),
        }
        engine.feed_at(&frame(99, 5.1), t0);
        let v = engine.feed_at(&frame(132, 5.2), t0);
        assert!(matches!(v, StabilityVerdict::Settled(_)));
    }

    #[test]
    fn times_out_at_the_deadline_not_later() {
        // max_wait 2s with nothing but empty frames.
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();

        let v = engine.feed_at(&empty(0), t0 + Duration::from_millis(500));
        assert!(!v.is_terminal());
        assert_eq!(
            engine.check_deadline_at(t0 + Duration::from_millis(1999)),
            None
        );
        assert_eq!(
            engine.check_deadline_at(t0 + Duration::from_secs(2)),
            Some(StabilityVerdict::TimedOut)
        );
        // A frame arriving at 3s does not produce a second verdict.
        let v = engine.feed_at(&frame(3000, 0.0), t0 + Duration::from_secs(3));
        assert_eq!(v, StabilityVerdict::TimedOut);
    }

    #[test]
    fn deadline_expiry_on_feed_beats_evaluation() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(1, 0.5), t0).unwrap();
        // Would settle on the first frame, but it arrives after the deadline.
        let v = engine.feed_at(&frame(0, 0.0), t0 + Duration::from_secs(3));
        assert_eq!(v, StabilityVerdict::TimedOut);
    }

    #[test]
    fn cancel_is_terminal_and_sticky() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();
        engine.feed_at(&frame(0, 0.0), t0);

        assert_eq!(
            engine.cancel(),
            StabilityVerdict::Aborted(AbortReason::Cancelled)
        );
        // A qualifying run completed after cancellation must not surface.
        for ms in [33u64, 66, 99, 132] {
            let v = engine.feed_at(&frame(ms, 0.0), t0);
            assert_eq!(v, StabilityVerdict::Aborted(AbortReason::Cancelled));
        }
    }

    #[test]
    fn single_frame_run_settles_with_zero_confidence_drift() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(1, 0.5), t0).unwrap();
        match engine.feed_at(&frame(0, 0.0), t0) {
            StabilityVerdict::Settled(obs) => {
                assert_eq!(obs.streak, 1);
                assert_relative_eq!(obs.max_drift_observed, 0.0);
            }
            other => panic!("expected Settled, got {other:?}"),
        }
    }

    #[test]
    fn non_monotonic_stamp_drops_the_frame() {
        let t0 = Instant::now();
        let mut engine = SettlingEngine::start_at(geometry(), params(3, 0.5), t0).unwrap();
        engine.feed_at(&frame(100, 0.0), t0);
        let v = engine.feed_at(&frame(50, 0.0), t0);
        assert_eq!(
            v,
            StabilityVerdict::Unsettled {
                streak: 0,
                last_drift: None
            }
        );
    }

    #[test]
    fn rejects_invalid_params_before_any_frame() {
        let bad = SettleParams {
            min_consistent_count: 0,
            ..SettleParams::default()
        };
        assert!(SettlingEngine::start(geometry(), bad).is_err());

        let bad = SettleParams {
            min_consistent_count: 64,
            window_capacity: 32,
            ..SettleParams::default()
        };
        assert_eq!(
            SettlingEngine::start(geometry(), bad).unwrap_err(),
            SettleParamsError::CountExceedsWindow {
                count: 64,
                capacity: 32
            }
        );
    }
}
