//! # mockfetch-core
//!
//! Simulated network latency for demo front ends.
//! Named requests complete after a configured latency, can be paused and resumed
//! mid-flight, and always resolve in expiration order.
//!
//! ### Key Submodules:
//! - `controller`: the single-timer scheduler (`MockFetchController`)
//! - `request`: request records, snapshots and completion handles
//! - `events`: typed lifecycle events and the synchronous `EventBus`
//! - `time`: the controller's millisecond clock over `tokio::time`
//!
//! ### Guarantees:
//! - At most one armed wake-up timer per controller
//! - Pause/resume never changes a request's total running time

pub mod controller;
pub mod error;
pub mod events;
pub mod request;
pub mod settings;
pub mod time;

pub mod prelude {
    pub use crate::controller::{mock_fetch, MockFetchController};
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::request::*;
    pub use crate::settings::*;
}

pub use controller::MockFetchController;
pub use error::ControllerError;
