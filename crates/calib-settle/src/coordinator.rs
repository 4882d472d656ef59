use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use calib_settle_core::{
    AbortReason, ConfigError, Detection, FailureReason, GridGeometry, SettleParams,
    SettleParamsError, SettledObservation, StabilityVerdict,
};
use calib_settle_engine::SettlingEngine;

use crate::stream::StreamError;

/// Policy for a `request` arriving while another request is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Reject the new request with [`RequestError::Busy`].
    #[default]
    Reject,
    /// Atomically preempt the active request (it terminates as `Preempted`)
    /// before accepting the new one.
    Preempt,
}

/// Progress report emitted once per evaluated detection while a request is
/// active.
///
/// The detection that terminates the request is the one exception to that
/// cadence: it delivers the terminal result instead of a feedback message,
/// so a run of `n` frames ending in settlement produces `n - 1` feedback
/// messages plus the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Current consistency streak length.
    pub streak: usize,
    /// Per-step drift of the most recent frame pair, absent until the run is
    /// at least two frames long.
    pub last_drift: Option<f32>,
}

/// Status of a settle request as seen by its caller.
///
/// `Active -> {Succeeded | Failed | Preempted}`. Acceptance is synchronous
/// in this in-process design: `request` validates and activates in one
/// step, so there is no observable pending phase and callers see `Active`
/// directly after `request` returns. Terminal states are sticky and
/// idempotently pollable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RequestStatus {
    Active {
        streak: usize,
        last_drift: Option<f32>,
    },
    Succeeded {
        observation: SettledObservation,
    },
    Failed {
        reason: FailureReason,
    },
    Preempted,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Succeeded { .. } | RequestStatus::Failed { .. } | RequestStatus::Preempted
        )
    }
}

/// Errors rejecting a `request` call. The coordinator stays usable.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RequestError {
    #[error("invalid request parameters: {0}")]
    InvalidParams(#[from] SettleParamsError),
    #[error("a request is already active on this channel")]
    Busy,
}

/// Caller-side handle for one settle request: identifies the request for
/// `poll`/`cancel` and owns the feedback receiver.
///
/// Not clonable; the handle is the single consumer of the feedback stream.
#[derive(Debug)]
pub struct RequestHandle {
    id: u64,
    feedback: Receiver<Feedback>,
}

impl RequestHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drain the feedback received so far without blocking.
    pub fn drain_feedback(&self) -> Vec<Feedback> {
        self.feedback.try_iter().collect()
    }

    /// Iterator over feedback received so far; never blocks.
    pub fn try_iter(&self) -> impl Iterator<Item = Feedback> + '_ {
        self.feedback.try_iter()
    }
}

struct ActiveRequest {
    id: u64,
    engine: SettlingEngine,
    feedback: Sender<Feedback>,
}

/// Per-channel action coordinator.
///
/// Owns at most one active [`SettlingEngine`] at a time and exposes it
/// through the asynchronous request/feedback/result protocol. `request`
/// never blocks; detections are pumped in through [`Coordinator::feed`] (or
/// the driver in this crate) and progress is delivered through the handle's
/// feedback channel and `poll`.
///
/// Cancellation dominates: once `cancel` is observed, no feedback and no
/// `Succeeded` result is emitted for that request, even if a qualifying run
/// completed at the same instant.
pub struct Coordinator {
    channel: String,
    geometry: GridGeometry,
    policy: BusyPolicy,
    next_id: u64,
    active: Option<ActiveRequest>,
    terminals: HashMap<u64, RequestStatus>,
}

impl Coordinator {
    /// Build a coordinator for one camera channel. The static geometry is
    /// validated here, once; a bad geometry means no requests are ever
    /// accepted on this channel.
    pub fn new(
        channel: impl Into<String>,
        geometry: GridGeometry,
        policy: BusyPolicy,
    ) -> Result<Self, ConfigError> {
        geometry.validate()?;
        Ok(Self {
            channel: channel.into(),
            geometry,
            policy,
            next_id: 0,
            active: None,
            terminals: HashMap::new(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    /// Submit a settle request. Non-blocking: returns a handle immediately;
    /// the result is delivered through `poll`/`feed` return values.
    pub fn request(&mut self, params: SettleParams) -> Result<RequestHandle, RequestError> {
        self.request_at(params, Instant::now())
    }

    pub fn request_at(
        &mut self,
        params: SettleParams,
        now: Instant,
    ) -> Result<RequestHandle, RequestError> {
        params.validate()?;

        if self.active.is_some() {
            match self.policy {
                BusyPolicy::Reject => return Err(RequestError::Busy),
                BusyPolicy::Preempt => {
                    // Preempt-then-accept, atomically from the caller's view.
                    self.finish_active_with(AbortReason::Superseded);
                }
            }
        }

        let engine = SettlingEngine::start_at(self.geometry, params, now)?;
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = mpsc::channel();
        self.active = Some(ActiveRequest {
            id,
            engine,
            feedback: tx,
        });
        info!("channel {}: request {} active", self.channel, id);
        Ok(RequestHandle { id, feedback: rx })
    }

    /// Evaluate one detection from the channel's stream. Returns the terminal
    /// status when this frame ends the active request, `None` otherwise
    /// (including when no request is active).
    pub fn feed(&mut self, detection: &Detection) -> Option<RequestStatus> {
        self.feed_at(detection, Instant::now())
    }

    pub fn feed_at(&mut self, detection: &Detection, now: Instant) -> Option<RequestStatus> {
        let current = self.active.as_mut()?;
        match current.engine.feed_at(detection, now) {
            StabilityVerdict::Unsettled { streak, last_drift } => {
                // One feedback message per incoming detection while active.
                let _ = current.feedback.send(Feedback { streak, last_drift });
                None
            }
            verdict => Some(self.finish_active(verdict)),
        }
    }

    /// Surface an upstream stream failure. The active request fails with
    /// `DetectorUnavailable`; the coordinator stays ready for the next
    /// request once a stream is available again.
    pub fn stream_failed(&mut self, error: &StreamError) -> Option<RequestStatus> {
        let finished = self.active.take()?;
        warn!(
            "channel {}: detection stream failed during request {}: {error}",
            self.channel, finished.id
        );
        let status = RequestStatus::Failed {
            reason: FailureReason::DetectorUnavailable,
        };
        self.terminals.insert(finished.id, status.clone());
        Some(status)
    }

    /// Wall-clock deadline check, for when the detection source goes idle.
    pub fn check_deadline(&mut self) -> Option<RequestStatus> {
        self.check_deadline_at(Instant::now())
    }

    pub fn check_deadline_at(&mut self, now: Instant) -> Option<RequestStatus> {
        let current = self.active.as_mut()?;
        let verdict = current.engine.check_deadline_at(now)?;
        Some(self.finish_active(verdict))
    }

    /// Current status of a request. Idempotent on terminal requests; `None`
    /// for handles this coordinator never issued.
    pub fn poll(&self, handle: &RequestHandle) -> Option<RequestStatus> {
        self.poll_id(handle.id)
    }

    fn poll_id(&self, id: u64) -> Option<RequestStatus> {
        if let Some(current) = &self.active {
            if current.id == id {
                return Some(RequestStatus::Active {
                    streak: current.engine.streak(),
                    last_drift: current.engine.last_drift(),
                });
            }
        }
        self.terminals.get(&id).cloned()
    }

    /// Cancel a request. The active request terminates as `Preempted`;
    /// cancelling an already-terminal request returns its recorded status.
    pub fn cancel(&mut self, handle: &RequestHandle) -> Option<RequestStatus> {
        if self
            .active
            .as_ref()
            .is_some_and(|current| current.id == handle.id)
        {
            debug!("channel {}: request {} cancelled", self.channel, handle.id);
            return Some(self.finish_active_with(AbortReason::Cancelled));
        }
        self.terminals.get(&handle.id).cloned()
    }

    fn finish_active_with(&mut self, reason: AbortReason) -> RequestStatus {
        if let Some(current) = self.active.as_mut() {
            let verdict = current.engine.abort(reason);
            self.finish_active(verdict)
        } else {
            RequestStatus::Preempted
        }
    }

    fn finish_active(&mut self, verdict: StabilityVerdict) -> RequestStatus {
        let status = match verdict {
            StabilityVerdict::Settled(observation) => RequestStatus::Succeeded { observation },
            StabilityVerdict::TimedOut => RequestStatus::Failed {
                reason: FailureReason::Timeout,
            },
            StabilityVerdict::Aborted(_) => RequestStatus::Preempted,
            StabilityVerdict::Unsettled { streak, last_drift } => {
                RequestStatus::Active { streak, last_drift }
            }
        };
        if let Some(finished) = self.active.take() {
            info!(
                "channel {}: request {} finished: {}",
                self.channel,
                finished.id,
                status_name(&status)
            );
            // Dropping the sender ends the feedback stream.
            self.terminals.insert(finished.id, status.clone());
        }
        status
    }
}

fn status_name(status: &RequestStatus) -> &'static str {
    match status {
        RequestStatus::Active { .. } => "active",
        RequestStatus::Succeeded { .. } => "succeeded",
        RequestStatus::Failed { .. } => "failed",
        RequestStatus::Preempted => "preempted",
    }
}
