use std::collections::VecDeque;

use calib_settle_core::Detection;

/// Failure of the upstream detection source. Surfaces to the caller as a
/// `DetectorUnavailable` request failure; the coordinator itself survives.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("detection stream disconnected")]
    Disconnected,
    #[error("detector fault: {0}")]
    Fault(String),
}

/// Pull interface over a detection source.
///
/// An ordered, potentially infinite, lazy sequence of detections. `None`
/// means end of stream. The core never restarts a stream; supplying a fresh
/// one for the next request is the caller's business.
pub trait DetectionStream {
    fn next_detection(&mut self) -> Option<Result<Detection, StreamError>>;
}

/// A pre-recorded detection sequence, for tests and the CLI driver.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    frames: VecDeque<Result<Detection, StreamError>>,
}

impl ScriptedStream {
    pub fn new(frames: impl IntoIterator<Item = Detection>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
        }
    }

    /// Append a detector fault at the current end of the script.
    pub fn then_error(mut self, error: StreamError) -> Self {
        self.frames.push_back(Err(error));
        self
    }
}

impl DetectionStream for ScriptedStream {
    fn next_detection(&mut self) -> Option<Result<Detection, StreamError>> {
        self.frames.pop_front()
    }
}

impl<S: DetectionStream + ?Sized> DetectionStream for &mut S {
    fn next_detection(&mut self) -> Option<Result<Detection, StreamError>> {
        (**self).next_detection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_settle_core::SourceInfo;
    use std::time::Duration;

    #[test]
    fn scripted_stream_yields_in_order_then_ends() {
        let mut stream = ScriptedStream::new([
            Detection::empty(Duration::from_millis(0), "f0", SourceInfo::pixels("cam0")),
            Detection::empty(Duration::from_millis(33), "f1", SourceInfo::pixels("cam0")),
        ]);
        assert_eq!(
            stream.next_detection().unwrap().unwrap().frame_id,
            "f0".to_string()
        );
        assert_eq!(
            stream.next_detection().unwrap().unwrap().frame_id,
            "f1".to_string()
        );
        assert!(stream.next_detection().is_none());
    }

    #[test]
    fn scripted_stream_injects_faults() {
        let mut stream = ScriptedStream::default().then_error(StreamError::Fault("io".into()));
        assert_eq!(
            stream.next_detection(),
            Some(Err(StreamError::Fault("io".into())))
        );
    }
}
