//! In-process job store.
//!
//! [`JobRegistry`] is the single source of truth for job lifecycle state.
//! It is an explicit object owned by whoever creates it (the orchestrator in
//! the API crate); there is no global table.

pub mod models;
pub mod repositories;

pub use repositories::JobRegistry;
