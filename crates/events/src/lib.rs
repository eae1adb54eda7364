//! Job lifecycle event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: one job state change (creation included).

pub mod bus;

pub use bus::{EventBus, JobEvent};
