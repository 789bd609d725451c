//! In-memory mono PCM audio and WAV conversion.

use crate::defaults::SAMPLE_RATE;
use crate::error::{EngineError, Result};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Mono 16-bit PCM audio. Cloning shares the sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EngineError::AudioDecode {
                message: "sample rate must be positive".to_string(),
            });
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    /// Silent clip of `duration` at `sample_rate`.
    pub fn silence(duration: Duration, sample_rate: u32) -> Result<Self> {
        let len = (duration.as_millis() * u128::from(sample_rate) / 1000) as usize;
        Self::new(vec![0; len], sample_rate)
    }

    /// Decodes a WAV stream, downmixing to mono and resampling to 16 kHz.
    pub fn from_wav_reader<R: Read>(reader: R) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| EngineError::AudioDecode {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let channels = usize::from(spec.channels.max(1));

        let raw_samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int if spec.bits_per_sample <= 16 => wav_reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> (spec.bits_per_sample - 16)) as i16))
                .collect(),
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
                .collect(),
        }
        .map_err(|e| EngineError::AudioDecode {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        let mono_samples = downmix(&raw_samples, channels);

        let samples = if source_rate != SAMPLE_RATE {
            resample(&mono_samples, source_rate, SAMPLE_RATE)
        } else {
            mono_samples
        };

        Self::new(samples, SAMPLE_RATE)
    }

    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_wav_reader(Cursor::new(bytes))
    }

    /// Reads and decodes a WAV file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| EngineError::InvalidInput {
            message: format!("Cannot open audio file {}: {}", path.display(), e),
        })?;
        Self::from_wav_reader(std::io::BufReader::new(file))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.samples.len() as u64 * 1000 / u64::from(self.sample_rate))
    }

    fn index_at(&self, at: Duration) -> usize {
        let index = at.as_millis() * u128::from(self.sample_rate) / 1000;
        (index as usize).min(self.samples.len())
    }

    /// Samples between `start` and `end`, clamped to the clip.
    pub fn slice(&self, start: Duration, end: Duration) -> &[i16] {
        let from = self.index_at(start);
        let to = self.index_at(end).max(from);
        &self.samples[from..to]
    }

    /// Encodes the span `[start, end)` as a 16-bit mono WAV file.
    pub fn encode_wav(&self, start: Duration, end: Duration) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let encode_err = |e: hound::Error| EngineError::AudioDecode {
            message: format!("Failed to encode WAV: {}", e),
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
        for &sample in self.slice(start, end) {
            writer.write_sample(sample).map_err(encode_err)?;
        }
        writer.finalize().map_err(encode_err)?;
        Ok(cursor.into_inner())
    }
}

/// Averages interleaved channels into one.
fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
