// Tempo Estimation - BPM detection using inter-onset intervals
// IOI histogram peak, refined by the mean of the intervals around it

use serde::{Deserialize, Serialize};

use crate::audio::Onset;

/// Tempo estimation result with BPM and beat grid positions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Estimated beats per minute; 0 when there was too little to go on
    pub bpm: f64,

    /// Confidence in the estimate [0.0, 1.0]
    pub confidence: f32,

    /// Beat grid positions in milliseconds, strictly increasing
    pub beat_positions_ms: Vec<f64>,

    /// Tempo of each histogram peak, strongest first
    pub candidates_bpm: Vec<f64>,
}

/// Configuration for tempo estimation
#[derive(Debug, Clone)]
pub struct TempoConfig {
    pub min_bpm: f64,
    pub max_bpm: f64,

    /// Number of bins for IOI histogram
    pub histogram_bins: usize,

    /// Minimum number of onsets required for estimation
    pub min_onsets: usize,

    /// Relative window around the histogram peak used for refinement
    pub refine_tolerance: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min_bpm: 40.0,
            max_bpm: 208.0,
            histogram_bins: 300,
            min_onsets: 8,
            refine_tolerance: 0.15,
        }
    }
}

impl TempoConfig {
    fn interval_range_ms(&self) -> (f64, f64) {
        (60000.0 / self.max_bpm, 60000.0 / self.min_bpm)
    }

    fn bin_width_ms(&self) -> f64 {
        let (min_interval, max_interval) = self.interval_range_ms();
        (max_interval - min_interval) / self.histogram_bins as f64
    }

    fn bin_center_ms(&self, bin: usize) -> f64 {
        self.interval_range_ms().0 + (bin as f64 + 0.5) * self.bin_width_ms()
    }
}

/// Estimate tempo from onset detections
///
/// 1. Compute inter-onset intervals (IOIs)
/// 2. Build a smoothed IOI histogram over the configured tempo range
/// 3. Take the strongest peak, refine it with the IOIs close to it
/// 4. Align a beat grid with the onsets
///
/// Too few onsets yields a zero estimate with zero confidence rather than a
/// guessed tempo.
pub fn estimate_tempo(onsets: &[Onset], config: &TempoConfig) -> TempoEstimate {
    let usable = config.min_bpm > 0.0 && config.max_bpm > config.min_bpm && config.histogram_bins >= 3;
    if !usable || onsets.len() < config.min_onsets {
        return TempoEstimate::default();
    }

    let iois = compute_iois(onsets);
    let histogram = build_ioi_histogram(&iois, config);
    let peaks = find_histogram_peaks(&histogram);
    let Some(&(best_bin, peak_strength)) = peaks.first() else {
        return TempoEstimate::default();
    };

    let interval_ms = refine_interval(&iois, config.bin_center_ms(best_bin), config.refine_tolerance);
    let bpm = (60000.0 / interval_ms).clamp(config.min_bpm, config.max_bpm);
    let interval_ms = 60000.0 / bpm;

    TempoEstimate {
        bpm,
        confidence: peak_confidence(peak_strength, &histogram),
        beat_positions_ms: generate_beat_grid(onsets, interval_ms),
        candidates_bpm: peaks
            .iter()
            .map(|&(bin, _)| 60000.0 / config.bin_center_ms(bin))
            .collect(),
    }
}

/// Compute inter-onset intervals (time between consecutive onsets)
fn compute_iois(onsets: &[Onset]) -> Vec<f64> {
    onsets
        .windows(2)
        .map(|pair| pair[1].timestamp_ms - pair[0].timestamp_ms)
        .filter(|&interval| interval > 0.0)
        .collect()
}

/// Build histogram of inter-onset intervals
/// Bins are distributed linearly across the tempo range
fn build_ioi_histogram(iois: &[f64], config: &TempoConfig) -> Vec<f32> {
    let (min_interval_ms, max_interval_ms) = config.interval_range_ms();
    let bin_width = config.bin_width_ms();
    let mut histogram = vec![0.0f32; config.histogram_bins];

    let mut add = |interval: f64, weight: f32| {
        if interval >= min_interval_ms && interval <= max_interval_ms {
            let bin = (((interval - min_interval_ms) / bin_width) as usize).min(config.histogram_bins - 1);
            histogram[bin] += weight;
        }
    };

    for &ioi in iois {
        add(ioi, 1.0);
        // Half and double tempo relationships, at lower weight
        add(ioi / 2.0, 0.5);
        add(ioi * 2.0, 0.5);
    }

    smooth_histogram(&histogram, 3)
}

/// Smooth histogram using moving average filter
fn smooth_histogram(histogram: &[f32], window_size: usize) -> Vec<f32> {
    let half_window = window_size / 2;
    (0..histogram.len())
        .map(|i| {
            let start = i.saturating_sub(half_window);
            let end = (i + half_window + 1).min(histogram.len());
            histogram[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Local maxima of the histogram, strongest first, at most five
fn find_histogram_peaks(histogram: &[f32]) -> Vec<(usize, f32)> {
    let mut peaks: Vec<(usize, f32)> = (1..histogram.len() - 1)
        .filter(|&i| histogram[i] > histogram[i - 1] && histogram[i] >= histogram[i + 1])
        .map(|i| (i, histogram[i]))
        .collect();

    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    peaks.truncate(5);
    peaks
}

/// Mean of the IOIs within `tolerance` of the peak interval, or the peak itself
fn refine_interval(iois: &[f64], peak_ms: f64, tolerance: f64) -> f64 {
    let close: Vec<f64> = iois
        .iter()
        .copied()
        .filter(|ioi| (ioi - peak_ms).abs() <= peak_ms * tolerance)
        .collect();
    if close.is_empty() {
        peak_ms
    } else {
        close.iter().sum::<f64>() / close.len() as f64
    }
}

/// Peak strength relative to the histogram mean, capped at 1
fn peak_confidence(peak_strength: f32, histogram: &[f32]) -> f32 {
    let mean = histogram.iter().sum::<f32>() / histogram.len() as f32;
    if mean <= 0.0 || !peak_strength.is_finite() {
        return 0.0;
    }
    let raw = peak_strength / (mean * 3.0);
    if raw.is_finite() {
        raw.min(1.0)
    } else {
        0.0
    }
}

/// Beat grid with the phase that best matches the onsets
fn generate_beat_grid(onsets: &[Onset], interval_ms: f64) -> Vec<f64> {
    let (Some(first), Some(last)) = (onsets.first(), onsets.last()) else {
        return Vec::new();
    };
    let first_onset = first.timestamp_ms;
    let last_onset = last.timestamp_ms;
    if last_onset <= first_onset || interval_ms <= 0.0 {
        return Vec::new();
    }

    let num_phase_tests = 8;
    let phase_step = interval_ms / num_phase_tests as f64;
    let mut best_phase = first_onset;
    let mut best_score = 0.0;

    for i in 0..num_phase_tests {
        let phase = first_onset + i as f64 * phase_step;
        let score = score_beat_alignment(onsets, phase, interval_ms, last_onset);
        if score > best_score {
            best_score = score;
            best_phase = phase;
        }
    }

    // Walk back so the grid also covers beats before the first onset
    while best_phase - interval_ms >= 0.0 {
        best_phase -= interval_ms;
    }

    let mut beat_positions = Vec::new();
    let mut beat_time = best_phase;
    while beat_time <= last_onset + interval_ms {
        beat_positions.push(beat_time);
        beat_time += interval_ms;
    }
    beat_positions
}

/// Score how well a beat grid aligns with detected onsets
fn score_beat_alignment(onsets: &[Onset], phase: f64, interval_ms: f64, end_time: f64) -> f64 {
    let tolerance_ms = interval_ms * 0.15;
    let mut score = 0.0;

    let mut beat_time = phase;
    while beat_time <= end_time {
        let closest_distance = onsets
            .iter()
            .map(|onset| (onset.timestamp_ms - beat_time).abs())
            .fold(f64::MAX, f64::min);

        if closest_distance < tolerance_ms {
            score += (tolerance_ms - closest_distance) / tolerance_ms;
        }
        beat_time += interval_ms;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onsets_every(interval_ms: f64, count: usize, offset_ms: f64) -> Vec<Onset> {
        (0..count)
            .map(|i| Onset {
                timestamp_ms: offset_ms + i as f64 * interval_ms,
                strength: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_compute_iois() {
        let iois = compute_iois(&onsets_every(500.0, 3, 0.0));
        assert_eq!(iois.len(), 2);
        assert!((iois[0] - 500.0).abs() < 0.01);
        assert!((iois[1] - 500.0).abs() < 0.01);
    }

    #[test]
    fn test_tempo_estimation_regular_beats() {
        let estimate = estimate_tempo(&onsets_every(500.0, 16, 250.0), &TempoConfig::default());

        assert!((estimate.bpm - 120.0).abs() < 0.5, "bpm {}", estimate.bpm);
        assert!(estimate.confidence > 0.0);
        assert!(!estimate.beat_positions_ms.is_empty());
        assert!(!estimate.candidates_bpm.is_empty());
        assert!(estimate
            .beat_positions_ms
            .windows(2)
            .all(|pair| pair[1] > pair[0]));
        assert!(estimate.beat_positions_ms[0] >= 0.0);
    }

    #[test]
    fn test_jittered_intervals_refine_to_mean() {
        // Alternating 490/510 ms intervals average to 120 BPM
        let mut onsets = Vec::new();
        let mut t = 100.0;
        for i in 0..20 {
            onsets.push(Onset {
                timestamp_ms: t,
                strength: 1.0,
            });
            t += if i % 2 == 0 { 490.0 } else { 510.0 };
        }
        let estimate = estimate_tempo(&onsets, &TempoConfig::default());
        assert!((estimate.bpm - 120.0).abs() < 1.0, "bpm {}", estimate.bpm);
    }

    #[test]
    fn test_tempo_estimation_insufficient_onsets() {
        let estimate = estimate_tempo(&onsets_every(500.0, 2, 0.0), &TempoConfig::default());
        assert_eq!(estimate.bpm, 0.0);
        assert_eq!(estimate.confidence, 0.0);
        assert!(estimate.beat_positions_ms.is_empty());
    }

    #[test]
    fn test_bpm_clamped_to_range() {
        let config = TempoConfig {
            min_bpm: 40.0,
            max_bpm: 100.0,
            ..TempoConfig::default()
        };
        // 120 BPM clicks: the double interval (60 BPM) is the only in-range reading
        let estimate = estimate_tempo(&onsets_every(500.0, 16, 0.0), &config);
        assert!(estimate.bpm >= 40.0 && estimate.bpm <= 100.0);
    }
}
