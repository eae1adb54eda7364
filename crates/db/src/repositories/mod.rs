//! Job storage with forward-only state enforcement.

pub mod job_registry;

pub use job_registry::JobRegistry;
