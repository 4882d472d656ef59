//! High-level facade crate for the `calib-settle-*` workspace.
//!
//! A camera pose calibration capture needs the checkerboard to be held
//! still; this workspace decides *when* a noisy per-frame detection stream
//! has settled enough to trust a single frame as a calibration observation,
//! and hands that observation back through an asynchronous
//! request/feedback/result protocol.
//!
//! This crate provides:
//! - the per-channel [`Coordinator`] implementing the action protocol on top
//!   of the settling engine
//! - a [`ChannelRegistry`] of per-camera coordinators
//! - the [`DetectionStream`] interface to the external corner detector, and
//!   one-shot driver helpers ([`settle_once`], [`run_to_completion`])
//! - stable re-exports of the underlying crates
//!
//! ## Quickstart
//!
//! ```
//! use calib_settle::core::{GridGeometry, SettleParams};
//! use calib_settle::{settle_once, BusyPolicy, Coordinator, RequestStatus, ScriptedStream};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let geometry = GridGeometry::new(6, 8, 0.025)?;
//! let mut coordinator = Coordinator::new("cam0", geometry, BusyPolicy::Reject)?;
//!
//! let mut stream = ScriptedStream::default(); // normally: the live detector
//! let (status, feedback) = settle_once(&mut coordinator, SettleParams::default(), &mut stream)?;
//! println!("{} feedback messages, settled: {}", feedback.len(),
//!     matches!(status, RequestStatus::Succeeded { .. }));
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_settle::core`: detections, geometry, parameters, verdicts.
//! - `calib_settle::engine`: the settling window and engine.
//! - `calib_settle` (this crate): coordinator, registry, streams, driver,
//!   and the `calib-settle` CLI binary (feature `cli`).

pub use calib_settle_core as core;
pub use calib_settle_engine as engine;

mod coordinator;
mod driver;
mod registry;
mod stream;

pub use calib_settle_core::{
    AbortReason, ConfigError, Detection, FailureReason, GridGeometry, SettleParams,
    SettleParamsError, SettledObservation, SourceInfo, StabilityVerdict, Units,
};
pub use calib_settle_engine::{SettlingEngine, SettlingWindow};

pub use coordinator::{BusyPolicy, Coordinator, Feedback, RequestError, RequestHandle, RequestStatus};
pub use driver::{run_to_completion, settle_once, DriveError};
pub use registry::ChannelRegistry;
pub use stream::{DetectionStream, ScriptedStream, StreamError};
