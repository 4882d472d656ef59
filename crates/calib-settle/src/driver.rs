use log::debug;

use calib_settle_core::SettleParams;

use crate::coordinator::{Coordinator, Feedback, RequestError, RequestHandle, RequestStatus};
use crate::stream::{DetectionStream, StreamError};

/// Errors from the one-shot driver helpers.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DriveError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("request handle was not issued by this coordinator")]
    UnknownRequest,
}

/// Pump a detection stream into the coordinator until the given request
/// reaches a terminal state.
///
/// The deadline is polled between frames, so an idle stream cannot stall
/// timeout delivery. End of stream (or a stream error) while the request is
/// still active fails it with `DetectorUnavailable`.
pub fn run_to_completion<S: DetectionStream>(
    coordinator: &mut Coordinator,
    stream: &mut S,
    handle: &RequestHandle,
) -> Result<RequestStatus, DriveError> {
    match coordinator.poll(handle) {
        Some(status) if status.is_terminal() => return Ok(status),
        Some(_) => {}
        None => return Err(DriveError::UnknownRequest),
    }

    loop {
        if let Some(status) = coordinator.check_deadline() {
            return Ok(status);
        }
        match stream.next_detection() {
            Some(Ok(detection)) => {
                debug!("frame {}", detection.frame_id);
                if let Some(status) = coordinator.feed(&detection) {
                    return Ok(status);
                }
            }
            Some(Err(error)) => {
                if let Some(status) = coordinator.stream_failed(&error) {
                    return Ok(status);
                }
            }
            None => {
                let status = coordinator
                    .stream_failed(&StreamError::Disconnected)
                    .ok_or(DriveError::UnknownRequest)?;
                return Ok(status);
            }
        }
    }
}

/// One-shot caller: submit a single request, run it to completion against
/// the given stream, and return the terminal status together with the
/// feedback emitted along the way.
///
/// This is the in-process equivalent of a launch-time driver script that
/// eagerly issues one fixed settle request.
pub fn settle_once<S: DetectionStream>(
    coordinator: &mut Coordinator,
    params: SettleParams,
    stream: &mut S,
) -> Result<(RequestStatus, Vec<Feedback>), DriveError> {
    let handle = coordinator.request(params)?;
    let status = run_to_completion(coordinator, stream, &handle)?;
    let feedback = handle.drain_feedback();
    Ok((status, feedback))
}
