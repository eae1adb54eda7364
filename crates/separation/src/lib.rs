//! Stem separation worker.
//!
//! Turns encoded input audio into one encoded WAV blob per stem. Pure
//! compute: no storage or network access happens here.
//!
//! ```text
//! input bytes ──► audio::decode ──► SeparationModel (rayon pool, N threads)
//!                                        │
//!                                        ▼
//!                 stems ◄── audio::encode_wav
//! ```
//!
//! The model is behind the [`SeparationModel`] trait so it can be swapped
//! without touching callers. [`BandSplitModel`] is the built-in
//! deterministic CPU model.

pub mod audio;
pub mod band_split;
pub mod error;
pub mod model;
pub mod worker;

pub use audio::AudioBuffer;
pub use band_split::BandSplitModel;
pub use error::SeparationError;
pub use model::{SeparationModel, Stem};
pub use worker::SeparationWorker;
