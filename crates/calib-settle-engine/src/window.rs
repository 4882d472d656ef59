use std::collections::VecDeque;
use std::time::Duration;

use calib_settle_core::Detection;

/// Sliding window over the most recent detections.
///
/// Invariants: stamps are strictly increasing front to back, the span between
/// the oldest and newest retained frame never exceeds `max_age`, and the
/// frame count never exceeds `capacity`. Oldest frames are evicted first.
#[derive(Debug)]
pub struct SettlingWindow {
    frames: VecDeque<Detection>,
    max_age: Duration,
    capacity: usize,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WindowError {
    #[error("detection stamp {stamp:?} is not after the newest retained stamp {newest:?}")]
    NonMonotonicStamp { stamp: Duration, newest: Duration },
}

impl SettlingWindow {
    pub fn new(max_age: Duration, capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(64)),
            max_age,
            capacity,
        }
    }

    /// Append a detection and evict frames that fall out of the age or
    /// capacity bound. Returns the number of evicted frames.
    pub fn push(&mut self, detection: Detection) -> Result<usize, WindowError> {
        if let Some(newest) = self.frames.back() {
            if detection.stamp <= newest.stamp {
                return Err(WindowError::NonMonotonicStamp {
                    stamp: detection.stamp,
                    newest: newest.stamp,
                });
            }
        }

        let newest_stamp = detection.stamp;
        self.frames.push_back(detection);

        let mut evicted = 0;
        while let Some(front) = self.frames.front() {
            let stale = newest_stamp - front.stamp > self.max_age;
            if stale || self.frames.len() > self.capacity {
                self.frames.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }
        Ok(evicted)
    }

    /// Newest retained detection.
    pub fn latest(&self) -> Option<&Detection> {
        self.frames.back()
    }

    /// Iterate over the retained detections, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Detection> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Stamp distance between the oldest and newest retained frame.
    pub fn span(&self) -> Duration {
        match (self.frames.front(), self.frames.back()) {
            (Some(oldest), Some(newest)) => newest.stamp - oldest.stamp,
            _ => Duration::ZERO,
        }
    }

    /// Drop all retained frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
