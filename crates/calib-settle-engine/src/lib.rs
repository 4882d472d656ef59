//! Settling engine for checkerboard detection streams.
//!
//! Consumes per-frame detections, retains the recent ones in a sliding
//! window, and decides when the board has been held still long enough
//! (`min_consistent_count` consecutive frames, every pair of them within
//! `max_drift` of each other) to trust a single frame as a calibration
//! observation.
//!
//! The engine is a plain state machine: no threads, no channels. One engine
//! instance serves one request on one channel; the action coordinator in
//! `calib-settle` owns it and pumps detections through it.

mod engine;
mod window;

pub use engine::SettlingEngine;
pub use window::{SettlingWindow, WindowError};
