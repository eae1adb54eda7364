//! Audio decoding (symphonia) and WAV encoding (hound).

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{alloc_samples, Result, SeparationError};

/// Maximum number of channels accepted.
pub const MAX_CHANNELS: usize = 8;

/// Decoded PCM audio, one `Vec` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

fn decode_error(reason: impl std::fmt::Display) -> SeparationError {
    SeparationError::Processing(format!("failed to decode audio: {reason}"))
}

/// Decode an encoded audio blob (WAV, FLAC, MP3, OGG, AAC/M4A, ...).
///
/// Rejects input with more than `max_frames` frames per channel with a
/// resource error, before the whole stream is held in memory.
pub fn decode(bytes: Vec<u8>, max_frames: usize) -> Result<AudioBuffer> {
    if bytes.is_empty() {
        return Err(decode_error("input is empty"));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(format!("unrecognized format ({e})")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(format!("unsupported codec ({e})")))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(format!("error reading packet ({e})"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt packet: skip it and keep going.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        let ch = spec.channels.count();
        if ch == 0 || ch > MAX_CHANNELS {
            return Err(decode_error(format!(
                "unsupported channel count {ch} (max {MAX_CHANNELS})"
            )));
        }
        if channels.is_empty() {
            channels = vec![Vec::new(); ch];
            sample_rate = sample_rate.or(Some(spec.rate));
        } else if channels.len() != ch {
            return Err(decode_error("channel count changed mid-stream"));
        }

        let frames = decoded.frames();
        if channels[0].len() + frames > max_frames {
            return Err(SeparationError::Resource(format!(
                "input exceeds the maximum of {max_frames} frames per channel"
            )));
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        for frame in sample_buf.samples().chunks_exact(ch) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| decode_error("unknown sample rate"))?;
    if channels.is_empty() || channels[0].is_empty() {
        return Err(decode_error("no audio samples in input"));
    }

    tracing::debug!(
        sample_rate,
        channels = channels.len(),
        frames = channels[0].len(),
        "Decoded input audio",
    );

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}

/// Encode planar channels as a 32-bit float WAV file.
pub fn encode_wav(channels: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>> {
    let channel_count = u16::try_from(channels.len())
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| SeparationError::Processing("cannot encode zero channels".into()))?;
    let frames = channels.first().map_or(0, Vec::len);
    if channels.iter().any(|c| c.len() != frames) {
        return Err(SeparationError::Processing(
            "cannot encode channels of unequal length".into(),
        ));
    }

    let spec = WavSpec {
        channels: channel_count,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut out = Vec::new();
    out.try_reserve_exact(44 + frames * channels.len() * 4)
        .map_err(|e| SeparationError::Resource(format!("cannot allocate WAV buffer: {e}")))?;
    let mut cursor = Cursor::new(out);

    let encode_err =
        |e: hound::Error| SeparationError::Processing(format!("failed to encode WAV: {e}"));
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
    for i in 0..frames {
        for channel in channels {
            writer.write_sample(channel[i]).map_err(encode_err)?;
        }
    }
    writer.finalize().map_err(encode_err)?;

    Ok(cursor.into_inner())
}

/// Generate silence, mostly useful for fixtures.
pub fn silence(channel_count: usize, frames: usize) -> Result<Vec<Vec<f32>>> {
    (0..channel_count).map(|_| alloc_samples(frames)).collect()
}
