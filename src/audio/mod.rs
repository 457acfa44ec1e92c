// Audio processing module
// WAV ingestion, spectral analysis and onset detection

pub mod features;
pub mod ingest;

pub use features::{
    detect_onsets, high_frequency_content, spectral_flux, Onset, OnsetConfig, SpectrumAnalyzer, WindowKind,
};
pub use ingest::{ingest_wav, ingest_wav_file, AudioData, AudioError};
