//! Shared domain types for the stem separation service.
//!
//! Kept free of async runtime and I/O dependencies so every other crate in
//! the workspace can depend on it.

pub mod error;
pub mod job_state;
pub mod stems;
pub mod types;
