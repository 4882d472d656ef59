use nalgebra::Point2;

/// Drift between two consecutive detections of the same board: the maximum
/// Euclidean displacement over corresponding feature points.
///
/// Returns `None` when the point counts differ — there is no meaningful
/// correspondence, and the stability predicate must never be certified
/// across a count mismatch.
pub fn step_drift(prev: &[Point2<f32>], next: &[Point2<f32>]) -> Option<f32> {
    if prev.len() != next.len() || prev.is_empty() {
        return None;
    }
    let mut worst = 0.0f32;
    for (a, b) in prev.iter().zip(next.iter()) {
        let d = (b - a).norm();
        if d > worst {
            worst = d;
        }
    }
    Some(worst)
}
