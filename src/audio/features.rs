// Spectral analysis and onset detection
// Window functions, cached real FFT magnitudes, spectral flux and peak picking

use realfft::{FftError, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Onset detection result
#[derive(Debug, Clone)]
pub struct Onset {
    /// Timestamp in milliseconds from start of audio
    pub timestamp_ms: f64,

    /// Onset strength [0.0, 1.0]
    pub strength: f32,
}

/// Configuration for onset detection
#[derive(Debug, Clone)]
pub struct OnsetConfig {
    /// FFT window size in samples (power of 2)
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Threshold multiplier for adaptive peak picking
    /// Threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f32,

    /// Minimum time between onsets in milliseconds
    pub min_onset_gap_ms: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 2048,
            hop_size: 512,
            threshold_factor: 1.5,
            min_onset_gap_ms: 30.0,
        }
    }
}

/// Supported analysis windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Hann,
    Hamming,
    Square,
}

impl WindowKind {
    pub const NAMES: &'static [&'static str] = &["hann", "hamming", "square"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hann" => Some(WindowKind::Hann),
            "hamming" => Some(WindowKind::Hamming),
            "square" => Some(WindowKind::Square),
            _ => None,
        }
    }

    /// Window coefficient `i` of an `n`-point window
    fn coefficient(self, i: usize, n: usize) -> f32 {
        let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
        match self {
            WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
            WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowKind::Square => 1.0,
        }
    }

    /// Multiply `samples` by the window in place
    pub fn apply(self, samples: &mut [f32]) {
        let n = samples.len();
        for (i, sample) in samples.iter_mut().enumerate() {
            *sample *= self.coefficient(i, n);
        }
    }
}

/// Magnitude spectrum computation with a plan cached per FFT size
pub struct SpectrumAnalyzer {
    planner: RealFftPlanner<f32>,
    plan: Option<Arc<dyn RealToComplex<f32>>>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        SpectrumAnalyzer {
            planner: RealFftPlanner::new(),
            plan: None,
        }
    }

    /// Magnitudes of the `size`-point FFT of `frame` (zero padded or
    /// truncated to `size`); `size / 2 + 1` bins
    pub fn magnitude(&mut self, frame: &[f32], size: usize) -> Result<Vec<f32>, FftError> {
        let plan = match &self.plan {
            Some(plan) if plan.len() == size => Arc::clone(plan),
            _ => {
                let plan = self.planner.plan_fft_forward(size);
                self.plan = Some(Arc::clone(&plan));
                plan
            }
        };

        let mut input = vec![0.0f32; size];
        let copy_len = frame.len().min(size);
        input[..copy_len].copy_from_slice(&frame[..copy_len]);
        let mut spectrum = plan.make_output_vec();
        plan.process(&mut input, &mut spectrum)?;
        Ok(spectrum.iter().map(|c| c.norm()).collect())
    }
}

/// Sum of positive magnitude increases between two spectra
pub fn spectral_flux(previous: &[f32], current: &[f32]) -> f32 {
    current
        .iter()
        .zip(previous)
        .map(|(curr, prev)| (curr - prev).max(0.0))
        .sum()
}

/// High frequency content: bin energies weighted by bin index
pub fn high_frequency_content(spectrum: &[f32]) -> f32 {
    spectrum
        .iter()
        .enumerate()
        .map(|(i, magnitude)| i as f32 * magnitude * magnitude)
        .sum()
}

/// Detect onsets in a mono signal using spectral flux with adaptive peak picking
pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &OnsetConfig) -> Result<Vec<Onset>, FftError> {
    if samples.is_empty() || config.hop_size == 0 || config.window_size == 0 {
        return Ok(Vec::new());
    }
    let flux = compute_spectral_flux(samples, config)?;
    Ok(pick_onset_peaks(&flux, sample_rate, config))
}

/// One flux value per full analysis frame; the first frame has no flux
fn compute_spectral_flux(samples: &[f32], config: &OnsetConfig) -> Result<Vec<f32>, FftError> {
    let window_size = config.window_size;
    if samples.len() < window_size {
        return Ok(Vec::new());
    }
    let num_frames = (samples.len() - window_size) / config.hop_size + 1;

    let mut analyzer = SpectrumAnalyzer::new();
    let mut flux = Vec::with_capacity(num_frames);
    let mut previous: Option<Vec<f32>> = None;
    let mut windowed = vec![0.0f32; window_size];

    for frame_idx in 0..num_frames {
        let start = frame_idx * config.hop_size;
        windowed.copy_from_slice(&samples[start..start + window_size]);
        WindowKind::Hann.apply(&mut windowed);
        let spectrum = analyzer.magnitude(&windowed, window_size)?;

        flux.push(match &previous {
            Some(prev) => spectral_flux(prev, &spectrum),
            None => 0.0,
        });
        previous = Some(spectrum);
    }

    Ok(flux)
}

/// Pick onset peaks from spectral flux using an adaptive threshold
fn pick_onset_peaks(flux: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Onset> {
    if flux.len() < 3 || sample_rate == 0 {
        return Vec::new();
    }

    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    let variance = flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
    let std_dev = variance.sqrt();
    let threshold = mean + config.threshold_factor * std_dev;

    let hop_size = config.hop_size;
    let min_gap_samples = (config.min_onset_gap_ms * sample_rate as f64 / 1000.0) as usize;
    let min_gap_frames = min_gap_samples / hop_size;

    let mut onsets = Vec::new();
    let mut last_onset_frame: Option<usize> = None;

    for i in 1..flux.len() - 1 {
        let is_peak = flux[i] > flux[i - 1] && flux[i] >= flux[i + 1];
        let above_threshold = flux[i] > threshold;
        let gap_ok = last_onset_frame.map_or(true, |last| i - last >= min_gap_frames);

        if is_peak && above_threshold && gap_ok {
            let timestamp_ms = (i * hop_size) as f64 * 1000.0 / sample_rate as f64;
            // 1e-6 keeps a flat flux curve from dividing by zero
            let strength = (flux[i] - threshold) / (std_dev + 1e-6);

            onsets.push(Onset {
                timestamp_ms,
                strength: strength.clamp(0.0, 1.0),
            });
            last_onset_frame = Some(i);
        }
    }

    onsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks(sample_rate: u32, period: usize, seconds: usize) -> Vec<f32> {
        let mut samples = vec![0.0f32; sample_rate as usize * seconds];
        let burst = sample_rate as usize / 100;
        let mut start = period / 2;
        while start + burst < samples.len() {
            for i in 0..burst {
                let t = i as f32 / sample_rate as f32;
                samples[start + i] = (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * (-t * 300.0).exp();
            }
            start += period;
        }
        samples
    }

    #[test]
    fn test_hann_window() {
        let mut samples = vec![1.0; 100];
        WindowKind::Hann.apply(&mut samples);

        // Window should taper at edges
        assert!(samples[0] < 0.1);
        assert!(samples[99] < 0.1);
        assert!(samples[50] > 0.9);
    }

    #[test]
    fn test_window_names() {
        for name in WindowKind::NAMES {
            assert!(WindowKind::from_name(name).is_some());
        }
        assert_eq!(WindowKind::from_name("blackman"), None);

        let mut flat = vec![2.0; 8];
        WindowKind::Square.apply(&mut flat);
        assert!(flat.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn test_spectrum_of_constant_signal() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.magnitude(&[1.0; 8], 8).unwrap();
        assert_eq!(spectrum.len(), 5);
        assert!((spectrum[0] - 8.0).abs() < 1e-4);
        assert!(spectrum[1..].iter().all(|m| m.abs() < 1e-4));

        // Shorter input is zero padded, plan is rebuilt for the new size
        let spectrum = analyzer.magnitude(&[1.0; 4], 16).unwrap();
        assert_eq!(spectrum.len(), 9);
        assert!((spectrum[0] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_flux_and_hfc() {
        assert_eq!(spectral_flux(&[1.0, 2.0, 3.0], &[2.0, 1.0, 5.0]), 3.0);
        assert_eq!(high_frequency_content(&[5.0, 1.0, 2.0]), 1.0 + 8.0);
    }

    #[test]
    fn test_onset_detection_empty() {
        let onsets = detect_onsets(&[], 44100, &OnsetConfig::default()).unwrap();
        assert!(onsets.is_empty());
    }

    #[test]
    fn test_onsets_follow_clicks() {
        let samples = clicks(44100, 22050, 4);
        let onsets = detect_onsets(&samples, 44100, &OnsetConfig::default()).unwrap();

        assert!(onsets.len() >= 6, "found {} onsets", onsets.len());
        for pair in onsets.windows(2) {
            let gap = pair[1].timestamp_ms - pair[0].timestamp_ms;
            assert!((gap - 500.0).abs() < 30.0, "gap {}", gap);
        }
    }
}
