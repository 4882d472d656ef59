//! Core types for checkerboard detection settling.
//!
//! This crate is intentionally small and purely value-level. It does *not*
//! depend on any concrete corner detector, image type, or threading
//! primitive; the settling engine and the action coordinator build on top
//! of it.

mod detection;
mod drift;
mod geometry;
mod logger;
mod params;
mod verdict;

pub use detection::{Detection, SourceInfo, Units};
pub use drift::step_drift;
pub use geometry::{ConfigError, GridGeometry};
pub use params::{SettleParams, SettleParamsError};
pub use verdict::{AbortReason, FailureReason, SettledObservation, StabilityVerdict};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
