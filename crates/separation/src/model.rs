//! Separation model abstraction.

use crate::audio::AudioBuffer;
use crate::error::Result;

/// One separated source, same layout as the input (planar channels).
#[derive(Debug, Clone, PartialEq)]
pub struct Stem {
    pub name: &'static str,
    pub channels: Vec<Vec<f32>>,
}

/// A stem separation model.
///
/// Implementations must:
/// - return exactly [`stem_names`](SeparationModel::stem_names), in that order;
/// - preserve channel count and frame count of the input;
/// - be deterministic for identical input and [`version`](SeparationModel::version);
/// - use rayon for internal parallelism, so the caller's pool bounds the
///   number of compute threads.
pub trait SeparationModel: Send + Sync {
    /// Model identifier, e.g. `"band-split"`.
    fn name(&self) -> &'static str;

    /// Version string. Output is only guaranteed stable within a version.
    fn version(&self) -> &'static str;

    /// The fixed stem set this model produces.
    fn stem_names(&self) -> &[&'static str];

    /// Separate `audio` into stems.
    fn separate(&self, audio: &AudioBuffer) -> Result<Vec<Stem>>;
}
