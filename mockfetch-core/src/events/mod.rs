//! ## mockfetch-core::events
//! **Request lifecycle events**
//!
//! The controller announces four transitions. Observers subscribe through
//! [`EventBus`] and receive a [`ControllerEvent`] carrying a snapshot of the
//! affected request.

pub mod bus;

pub use bus::{EventBus, Listener, ListenerId};

use serde::Serialize;
use std::fmt;

use crate::request::RequestSnapshot;

/// Event kinds, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    NewRequest,
    RequestPaused,
    RequestResumed,
    RequestCompleted,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NewRequest,
        EventKind::RequestPaused,
        EventKind::RequestResumed,
        EventKind::RequestCompleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewRequest => "new-request",
            EventKind::RequestPaused => "request-paused",
            EventKind::RequestResumed => "request-resumed",
            EventKind::RequestCompleted => "request-completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle transition of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "request", rename_all = "kebab-case")]
pub enum ControllerEvent {
    NewRequest(RequestSnapshot),
    RequestPaused(RequestSnapshot),
    RequestResumed(RequestSnapshot),
    RequestCompleted(RequestSnapshot),
}

impl ControllerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ControllerEvent::NewRequest(_) => EventKind::NewRequest,
            ControllerEvent::RequestPaused(_) => EventKind::RequestPaused,
            ControllerEvent::RequestResumed(_) => EventKind::RequestResumed,
            ControllerEvent::RequestCompleted(_) => EventKind::RequestCompleted,
        }
    }

    pub fn request(&self) -> &RequestSnapshot {
        match self {
            ControllerEvent::NewRequest(r)
            | ControllerEvent::RequestPaused(r)
            | ControllerEvent::RequestResumed(r)
            | ControllerEvent::RequestCompleted(r) => r,
        }
    }
}
