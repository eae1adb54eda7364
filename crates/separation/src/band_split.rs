//! Deterministic crossover separation model.
//!
//! Each channel is split with 4th-order Linkwitz-Riley style filters
//! (two cascaded Butterworth biquads):
//!
//! | stem     | band                 |
//! |----------|----------------------|
//! | `bass`   | below 150 Hz         |
//! | `vocals` | 300 Hz to 3.4 kHz    |
//! | `drums`  | above 5 kHz          |
//! | `other`  | residual             |
//!
//! `other` is the input minus the three filtered bands, so the stems always
//! sum back to the input.

use rayon::prelude::*;
use stemsvc_core::stems::{DEFAULT_STEMS, STEM_BASS, STEM_DRUMS, STEM_OTHER, STEM_VOCALS};

use crate::audio::AudioBuffer;
use crate::error::{alloc_samples, Result, SeparationError};
use crate::model::{SeparationModel, Stem};

const BASS_CUTOFF_HZ: f32 = 150.0;
const VOCALS_LOW_HZ: f32 = 300.0;
const VOCALS_HIGH_HZ: f32 = 3_400.0;
const DRUMS_CUTOFF_HZ: f32 = 5_000.0;

/// Butterworth Q for a 2nd-order section.
const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Cutoffs are kept below this fraction of the sample rate.
const MAX_CUTOFF_RATIO: f32 = 0.45;

#[derive(Debug, Clone, Copy)]
enum FilterKind {
    LowPass,
    HighPass,
}

/// Direct form I biquad (RBJ cookbook coefficients).
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    fn new(kind: FilterKind, cutoff_hz: f32, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let cutoff = cutoff_hz.min(sr * MAX_CUTOFF_RATIO);
        let w0 = 2.0 * std::f32::consts::PI * cutoff / sr;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * BUTTERWORTH_Q);
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn process_in_place(&self, samples: &mut [f32]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for s in samples.iter_mut() {
            let x0 = *s;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *s = y0;
        }
    }
}

/// One filtered band: a chain of biquads applied in order.
#[derive(Debug, Clone, Copy)]
enum Band {
    Bass,
    Vocals,
    Drums,
}

impl Band {
    const ALL: [Band; 3] = [Band::Bass, Band::Vocals, Band::Drums];

    fn stages(self) -> &'static [(FilterKind, f32)] {
        match self {
            Band::Bass => &[
                (FilterKind::LowPass, BASS_CUTOFF_HZ),
                (FilterKind::LowPass, BASS_CUTOFF_HZ),
            ],
            Band::Vocals => &[
                (FilterKind::HighPass, VOCALS_LOW_HZ),
                (FilterKind::HighPass, VOCALS_LOW_HZ),
                (FilterKind::LowPass, VOCALS_HIGH_HZ),
                (FilterKind::LowPass, VOCALS_HIGH_HZ),
            ],
            Band::Drums => &[
                (FilterKind::HighPass, DRUMS_CUTOFF_HZ),
                (FilterKind::HighPass, DRUMS_CUTOFF_HZ),
            ],
        }
    }

    fn apply(self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let mut out = alloc_samples(input.len())?;
        out.copy_from_slice(input);
        for &(kind, cutoff) in self.stages() {
            Biquad::new(kind, cutoff, sample_rate).process_in_place(&mut out);
        }
        Ok(out)
    }
}

/// Built-in crossover model. Cheap, deterministic, and dependency-free.
#[derive(Debug, Default, Clone, Copy)]
pub struct BandSplitModel;

impl BandSplitModel {
    pub fn new() -> Self {
        Self
    }
}

impl SeparationModel for BandSplitModel {
    fn name(&self) -> &'static str {
        "band-split"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn stem_names(&self) -> &[&'static str] {
        &DEFAULT_STEMS
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<Vec<Stem>> {
        if audio.sample_rate == 0 {
            return Err(SeparationError::Processing("sample rate must be positive".into()));
        }

        // One task per (channel, band); runs on whatever rayon pool the caller installed.
        let tasks: Vec<(usize, Band)> = (0..audio.channel_count())
            .flat_map(|ch| Band::ALL.into_iter().map(move |band| (ch, band)))
            .collect();
        let filtered: Vec<Vec<f32>> = tasks
            .par_iter()
            .map(|&(ch, band)| band.apply(&audio.channels[ch], audio.sample_rate))
            .collect::<Result<_>>()?;

        let mut bass = Vec::with_capacity(audio.channel_count());
        let mut vocals = Vec::with_capacity(audio.channel_count());
        let mut drums = Vec::with_capacity(audio.channel_count());
        let mut other = Vec::with_capacity(audio.channel_count());

        let mut bands = filtered.into_iter();
        for input in &audio.channels {
            let (Some(b), Some(v), Some(d)) = (bands.next(), bands.next(), bands.next()) else {
                return Err(SeparationError::Processing("band count mismatch".into()));
            };
            let mut residual = alloc_samples(input.len())?;
            for (i, r) in residual.iter_mut().enumerate() {
                *r = input[i] - b[i] - v[i] - d[i];
            }
            bass.push(b);
            vocals.push(v);
            drums.push(d);
            other.push(residual);
        }

        // Output order follows DEFAULT_STEMS.
        Ok(vec![
            Stem { name: STEM_VOCALS, channels: vocals },
            Stem { name: STEM_DRUMS, channels: drums },
            Stem { name: STEM_BASS, channels: bass },
            Stem { name: STEM_OTHER, channels: other },
        ])
    }
}
