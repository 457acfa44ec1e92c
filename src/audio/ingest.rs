// Audio ingestion module
// Reads WAV data, normalizes samples and mixes down to mono

use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV data: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio has no channels")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to f32 in range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Mix down to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Ingest a WAV file from raw bytes
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    decode(WavReader::new(Cursor::new(data))?)
}

/// Ingest a WAV file from disk
pub fn ingest_wav_file(path: impl AsRef<Path>) -> Result<AudioData, AudioError> {
    decode(WavReader::open(path)?)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<AudioData, AudioError> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::InvalidData);
    }

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        // hound hands 8-bit PCM back already centered on zero
        (SampleFormat::Int, 8) => normalized::<R, i8>(&mut reader, 128.0)?,
        (SampleFormat::Int, 16) => normalized::<R, i16>(&mut reader, 32768.0)?,
        (SampleFormat::Int, 24) => normalized::<R, i32>(&mut reader, 8388608.0)?,
        (SampleFormat::Int, 32) => normalized::<R, i32>(&mut reader, 2147483648.0)?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, bits
            )));
        }
    };

    let frame_count = samples.len() / spec.channels as usize;
    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: spec.bits_per_sample,
        frame_count,
    })
}

fn normalized<R: Read, S: hound::Sample + Into<f64>>(
    reader: &mut WavReader<R>,
    full_scale: f64,
) -> Result<Vec<f32>, hound::Error> {
    reader
        .samples::<S>()
        .map(|sample| sample.map(|s| (s.into() / full_scale) as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(spec: WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_audio_data_to_mono() {
        let audio_data = AudioData {
            samples: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            frame_count: 3,
        };

        let mono = audio_data.to_mono();

        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.15).abs() < 1e-6);
        assert!((mono[1] - 0.35).abs() < 1e-6);
        assert!((mono[2] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_ingest_stereo_pcm16() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[16384, -16384, 16384, 16384]);

        let audio = ingest_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.frame_count, 2);
        assert_eq!(audio.to_mono(), vec![0.0, 0.5]);
        assert!((audio.duration_secs() - 2.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_ingest_rejects_garbage() {
        let result = ingest_wav(b"definitely not a wav file");
        assert!(matches!(result, Err(AudioError::WavReadError(_))));
    }
}
