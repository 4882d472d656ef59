use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Coordinate units of a detection's feature points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Image pixel coordinates.
    Pixels,
    /// Metric coordinates (e.g. after undistortion/back-projection).
    Metric,
}

/// Provenance of a detection: which camera produced it and in which units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Logical camera/channel identifier.
    pub camera: String,
    pub units: Units,
}

impl SourceInfo {
    pub fn pixels(camera: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            units: Units::Pixels,
        }
    }
}

/// One frame's worth of checkerboard corner extraction.
///
/// `points` is the ordered grid of detected feature points; an empty vector
/// means "no detection this frame". Detections are immutable once produced:
/// the settling engine borrows them during evaluation and only clones the
/// representative frame into a settled observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Time since the detection source's epoch. Strictly increasing within
    /// one stream.
    pub stamp: Duration,
    /// Frame identifier from the source (e.g. capture sequence number).
    pub frame_id: String,
    /// Ordered feature points, row-major over the checkerboard grid.
    /// Empty means the board was not found in this frame.
    pub points: Vec<Point2<f32>>,
    pub source: SourceInfo,
}

impl Detection {
    /// A frame in which the board was not found.
    pub fn empty(stamp: Duration, frame_id: impl Into<String>, source: SourceInfo) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
            points: Vec::new(),
            source,
        }
    }

    /// True when the board was not found in this frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection_has_no_points() {
        let d = Detection::empty(Duration::from_millis(33), "f0", SourceInfo::pixels("cam0"));
        assert!(d.is_empty());
        assert_eq!(d.frame_id, "f0");
    }

    #[test]
    fn detection_round_trips_through_json() {
        let d = Detection {
            stamp: Duration::from_millis(100),
            frame_id: "f3".into(),
            points: vec![Point2::new(1.0, 2.0), Point2::new(3.5, 4.25)],
            source: SourceInfo::pixels("cam0"),
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: Detection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
