//! Separation error types

use thiserror::Error;

/// Errors that can occur during audio separation
#[derive(Error, Debug)]
pub enum SeparationError {
    /// The input is not decodable audio, or the model rejected it.
    #[error("processing error: {0}")]
    Processing(String),

    /// Threads or memory could not be obtained.
    #[error("resource error: {0}")]
    Resource(String),
}

pub type Result<T> = std::result::Result<T, SeparationError>;

/// Allocate a zeroed sample buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_samples(len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        SeparationError::Resource(format!("cannot allocate {len} samples: {e}"))
    })?;
    buf.resize(len, 0.0);
    Ok(buf)
}
