// Rhythm analysis module
// Tempo and beat-grid estimation from detected onsets

pub mod tempo;

pub use tempo::{estimate_tempo, TempoConfig, TempoEstimate};
