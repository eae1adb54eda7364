//! Thread-budgeted separation entry point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use stemsvc_core::stems::validate_stem_name;

use crate::audio::{decode, encode_wav};
use crate::error::{Result, SeparationError};
use crate::model::SeparationModel;

/// Default ceiling on decoded input length: 30 minutes at 48 kHz.
pub const DEFAULT_MAX_INPUT_FRAMES: usize = 48_000 * 60 * 30;

/// Runs a [`SeparationModel`] on encoded audio under a hard thread ceiling.
///
/// Stateless with respect to jobs; one instance is shared by every job.
#[derive(Clone)]
pub struct SeparationWorker {
    model: Arc<dyn SeparationModel>,
    max_input_frames: usize,
}

impl SeparationWorker {
    pub fn new(model: Arc<dyn SeparationModel>) -> Self {
        Self {
            model,
            max_input_frames: DEFAULT_MAX_INPUT_FRAMES,
        }
    }

    /// Override the decoded-length ceiling.
    pub fn with_max_input_frames(mut self, max_input_frames: usize) -> Self {
        self.max_input_frames = max_input_frames;
        self
    }

    /// The stem names every successful call returns.
    pub fn stem_names(&self) -> Vec<String> {
        self.model.stem_names().iter().map(|s| s.to_string()).collect()
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn model_version(&self) -> &'static str {
        self.model.version()
    }

    /// Decode `input`, separate it, and encode every stem as WAV.
    ///
    /// All compute (model and encoding) runs inside a dedicated rayon pool of
    /// exactly `thread_budget` threads. Blocks the calling thread; call it
    /// from a blocking context.
    pub fn separate(
        &self,
        input: Vec<u8>,
        thread_budget: usize,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        if thread_budget == 0 {
            return Err(SeparationError::Resource(
                "thread budget must be at least 1".into(),
            ));
        }

        let started = Instant::now();
        let audio = decode(input, self.max_input_frames)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_budget)
            .thread_name(|i| format!("separation-{i}"))
            .build()
            .map_err(|e| {
                SeparationError::Resource(format!("failed to create compute thread pool: {e}"))
            })?;

        let stems = pool.install(|| self.model.separate(&audio))?;

        let produced: Vec<&str> = stems.iter().map(|s| s.name).collect();
        if produced != self.model.stem_names() {
            return Err(SeparationError::Processing(format!(
                "model {} produced stems {produced:?}, expected {:?}",
                self.model.name(),
                self.model.stem_names()
            )));
        }
        // Stem names end up in storage keys.
        for name in &produced {
            validate_stem_name(name).map_err(|e| SeparationError::Processing(e.to_string()))?;
        }

        let sample_rate = audio.sample_rate;
        let encoded: Vec<(String, Vec<u8>)> = pool.install(|| {
            stems
                .par_iter()
                .map(|stem| Ok((stem.name.to_string(), encode_wav(&stem.channels, sample_rate)?)))
                .collect::<Result<_>>()
        })?;

        tracing::info!(
            model = self.model.name(),
            model_version = self.model.version(),
            thread_budget,
            duration_secs = audio.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Separation finished",
        );

        Ok(encoded.into_iter().collect())
    }
}
