use thiserror::Error;

use crate::request::RequestId;

/// Misuse of the controller API. Requests themselves never fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("Unknown request id: {0}")]
    UnknownRequestId(String),

    #[error("Request {0} is not paused")]
    InvalidResumeState(RequestId),

    #[error("No tokio runtime available to drive the controller timer")]
    TimerUnavailable,

    #[error("Controller dropped before request {0} completed")]
    Dropped(RequestId),
}
