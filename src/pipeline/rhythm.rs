// Rhythm analysis orchestration
// Loader -> RhythmExtractor2013 compositions in batch and streaming mode

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::audio::ingest_wav;
use crate::error::{EngineError, EngineResult};
use crate::registry::{registry, ParameterMap, Registry};
use crate::streaming::{Network, SchedulerConfig, StreamingInstance, VectorInput, VectorOutput};
use crate::types::{DataType, Slot, Value};

use super::trace::{TraceBuilder, TraceEntry, TraceWriter};

/// Tempo analysis of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmReport {
    pub bpm: f32,
    pub confidence: f32,
    /// Beat positions in seconds
    pub ticks: Vec<f32>,
    /// Candidate tempi, strongest first
    pub estimates: Vec<f32>,
    /// Seconds between consecutive ticks
    pub bpm_intervals: Vec<f32>,
}

const OUTPUTS: [(&str, DataType); 5] = [
    ("bpm", DataType::Real),
    ("confidence", DataType::Real),
    ("ticks", DataType::RealVector),
    ("estimates", DataType::RealVector),
    ("bpmIntervals", DataType::RealVector),
];

/// Analyze a WAV file with the process-wide registry
pub fn analyze_rhythm(path: &Path, sample_rate: f32, trace: Option<&TraceWriter>) -> EngineResult<RhythmReport> {
    analyze_rhythm_with(registry()?, path, sample_rate, trace)
}

/// Batch composition: MonoLoader feeds RhythmExtractor2013 through a
/// caller-owned buffer. Both instances are dropped on every exit path.
pub fn analyze_rhythm_with(
    registry: &Registry,
    path: &Path,
    sample_rate: f32,
    trace: Option<&TraceWriter>,
) -> EngineResult<RhythmReport> {
    let audio = Slot::of(DataType::RealVector);
    traced(trace, "load", || {
        let params = ParameterMap::new()
            .with("filename", path.to_string_lossy().into_owned())
            .with("sampleRate", sample_rate);
        let mut loader = registry.create("MonoLoader", &params)?;
        loader.bind_output("audio", &audio)?;
        loader.compute()
    })?;
    info!(
        "Loaded {} samples from {}",
        audio.real_vector().map_or(0, |s| s.len()),
        path.display()
    );

    traced(trace, "rhythm", || extract(registry, &audio, sample_rate))
}

/// Analyze many files in order. A failing file is reported in its own
/// result and does not stop the others; `progress` receives
/// `(done, total)` after each file.
pub fn analyze_files(
    registry: &Registry,
    paths: &[PathBuf],
    sample_rate: f32,
    mut progress: impl FnMut(usize, usize),
    trace: Option<&TraceWriter>,
) -> Vec<(PathBuf, EngineResult<RhythmReport>)> {
    let total = paths.len();
    let mut results = Vec::with_capacity(total);
    for (index, path) in paths.iter().enumerate() {
        let result = analyze_rhythm_with(registry, path, sample_rate, trace);
        match &result {
            Ok(report) => info!("{}: {:.1} BPM", path.display(), report.bpm),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
        results.push((path.clone(), result));

        let done = index + 1;
        if let Some(writer) = trace {
            let entry = TraceBuilder::stage("files")
                .progress(done as f32 / total as f32, format!("Analyzed {} of {}", done, total));
            record_quietly(writer, entry);
        }
        progress(done, total);
    }
    results
}

/// Batch analysis of an in-memory WAV file, mixed down to mono
pub fn analyze_wav_bytes(registry: &Registry, data: &[u8], sample_rate: f32) -> EngineResult<RhythmReport> {
    let audio = ingest_wav(data).map_err(|e| EngineError::computation("WavInput", e.to_string()))?;
    if audio.sample_rate as f32 != sample_rate {
        return Err(EngineError::computation(
            "WavInput",
            format!(
                "audio is sampled at {} Hz, expected {} Hz (resampling is not supported)",
                audio.sample_rate, sample_rate
            ),
        ));
    }
    analyze_signal(registry, audio.to_mono(), sample_rate)
}

/// Batch analysis of samples already in memory
pub fn analyze_signal(registry: &Registry, samples: Vec<f32>, sample_rate: f32) -> EngineResult<RhythmReport> {
    extract(registry, &Slot::new(samples), sample_rate)
}

fn extract(registry: &Registry, audio: &Slot, sample_rate: f32) -> EngineResult<RhythmReport> {
    let params = ParameterMap::new().with("sampleRate", sample_rate);
    let mut extractor = registry.create("RhythmExtractor2013", &params)?;
    extractor.bind_input("signal", audio)?;

    let slots: Vec<Slot> = OUTPUTS.iter().map(|&(_, data_type)| Slot::of(data_type)).collect();
    for ((name, _), slot) in OUTPUTS.iter().zip(&slots) {
        extractor.bind_output(name, slot)?;
    }
    extractor.compute()?;

    Ok(RhythmReport {
        bpm: real(&slots[0])?,
        confidence: real(&slots[1])?,
        ticks: slots[2].real_vector().unwrap_or_default(),
        estimates: slots[3].real_vector().unwrap_or_default(),
        bpm_intervals: slots[4].real_vector().unwrap_or_default(),
    })
}

/// Streaming composition of the same analysis over a WAV file
pub fn stream_rhythm(
    registry: &Registry,
    path: &Path,
    sample_rate: f32,
    config: SchedulerConfig,
) -> EngineResult<RhythmReport> {
    let params = ParameterMap::new()
        .with("filename", path.to_string_lossy().into_owned())
        .with("sampleRate", sample_rate);
    let loader = registry.create_streaming("MonoLoader", &params)?;
    stream_from(registry, loader, sample_rate, config)
}

/// Streaming analysis of samples already in memory
pub fn stream_signal(
    registry: &Registry,
    samples: &[f32],
    sample_rate: f32,
    config: SchedulerConfig,
) -> EngineResult<RhythmReport> {
    stream_from(registry, VectorInput::reals(samples), sample_rate, config)
}

fn stream_from(
    registry: &Registry,
    source: StreamingInstance,
    sample_rate: f32,
    config: SchedulerConfig,
) -> EngineResult<RhythmReport> {
    let params = ParameterMap::new().with("sampleRate", sample_rate);
    let mut network = Network::with_config(config);
    let source = network.add("source", source)?;
    let extractor = network.add(
        "rhythm",
        registry.create_streaming("RhythmExtractor2013", &params)?,
    )?;
    network.chain(&[source, extractor])?;

    // Scalar outputs arrive as single real tokens, vectors as single rows
    let mut slots = Vec::with_capacity(OUTPUTS.len());
    for (name, data_type) in OUTPUTS {
        let slot = match data_type {
            DataType::Real => Slot::of(DataType::RealVector),
            _ => Slot::of(DataType::RealMatrix),
        };
        let sink = network.add(format!("{}_sink", name), VectorOutput::instance(&slot)?)?;
        network.connect(extractor, name, sink, "data")?;
        slots.push(slot);
    }

    let summary = network.run()?;
    info!("Streaming rhythm analysis finished in {} steps", summary.steps);

    Ok(RhythmReport {
        bpm: single_token(&slots[0])?,
        confidence: single_token(&slots[1])?,
        ticks: single_row(&slots[2])?,
        estimates: single_row(&slots[3])?,
        bpm_intervals: single_row(&slots[4])?,
    })
}

fn real(slot: &Slot) -> EngineResult<f32> {
    slot.real().ok_or_else(|| EngineError::TypeMismatch {
        port: "report".to_string(),
        expected: DataType::Real,
        found: slot.data_type(),
    })
}

fn single_token(slot: &Slot) -> EngineResult<f32> {
    match slot.real_vector().as_deref() {
        Some([value]) => Ok(*value),
        other => Err(EngineError::Scheduling(format!(
            "expected exactly one token, found {:?}",
            other.map(<[f32]>::len)
        ))),
    }
}

fn single_row(slot: &Slot) -> EngineResult<Vec<f32>> {
    match slot.get() {
        Value::RealMatrix(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
        Value::RealMatrix(rows) => Err(EngineError::Scheduling(format!(
            "expected exactly one row, found {}",
            rows.len()
        ))),
        other => Err(EngineError::TypeMismatch {
            port: "report".to_string(),
            expected: DataType::RealMatrix,
            found: other.data_type(),
        }),
    }
}

/// Run one stage, recording start and outcome in the trace when present.
/// A stage result that serializes to something other than null is attached
/// to its completion entry.
fn traced<T: Serialize>(
    trace: Option<&TraceWriter>,
    stage: &str,
    run: impl FnOnce() -> EngineResult<T>,
) -> EngineResult<T> {
    let Some(writer) = trace else {
        return run();
    };
    writer.write(&TraceBuilder::stage(stage).start(format!("Starting {}", stage)))?;
    match run() {
        Ok(value) => {
            let mut entry = TraceBuilder::stage(stage).complete(format!("Finished {}", stage));
            match serde_json::to_value(&value) {
                Ok(serde_json::Value::Null) => {}
                Ok(data) => entry = entry.with_data(data),
                Err(e) => warn!("Stage {} result not traced: {}", stage, e),
            }
            writer.write(&entry)?;
            Ok(value)
        }
        Err(err) => {
            warn!("Stage {} failed: {}", stage, err);
            record_quietly(writer, TraceBuilder::stage(stage).failed(err.to_string()));
            Err(err)
        }
    }
}

/// Trace failures here are logged, not returned
fn record_quietly(writer: &TraceWriter, entry: TraceEntry) {
    if let Err(e) = writer.write(&entry) {
        warn!("Could not write trace to {}: {}", writer.path().display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::trace::{read_trace_file, TraceStatus};

    fn click_track(sample_rate: u32, period: usize, seconds: usize) -> Vec<f32> {
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

    fn write_wav<W: std::io::Write + std::io::Seek>(writer: W, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut wav = hound::WavWriter::new(writer, spec).unwrap();
        for &sample in samples {
            wav.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        wav.finalize().unwrap();
    }

    #[test]
    fn test_batch_and_streaming_agree() {
        let registry = Registry::with_builtins().unwrap();
        let samples = click_track(44100, 22050, 6);

        let batch = analyze_signal(&registry, samples.clone(), 44100.0).unwrap();
        let streamed = stream_signal(&registry, &samples, 44100.0, SchedulerConfig::default()).unwrap();

        assert!((batch.bpm - 120.0).abs() < 2.0, "bpm {}", batch.bpm);
        assert_eq!(batch, streamed);
    }

    #[test]
    fn test_missing_file_is_traced() {
        let registry = Registry::with_builtins().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path().join("trace.jsonl"));

        let err = analyze_rhythm_with(&registry, &dir.path().join("missing.wav"), 44100.0, Some(&writer)).unwrap_err();
        assert!(matches!(err, EngineError::Computation { .. }));

        let entries = read_trace_file(writer.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, "load");
        assert_eq!(entries[1].status, TraceStatus::Failed);
    }

    #[test]
    fn test_analyze_files_continues_past_failure() {
        let registry = Registry::with_builtins().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let samples = click_track(44100, 22050, 6);
        let paths = vec![dir.path().join("a.wav"), dir.path().join("missing.wav"), dir.path().join("b.wav")];
        for path in [&paths[0], &paths[2]] {
            write_wav(std::fs::File::create(path).unwrap(), &samples);
        }
        let writer = TraceWriter::new(dir.path().join("trace.jsonl"));

        let mut calls = Vec::new();
        let results = analyze_files(&registry, &paths, 44100.0, |done, total| calls.push((done, total)), Some(&writer));

        assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].0, paths[1]);
        assert!(matches!(results[1].1, Err(EngineError::Computation { .. })));
        for index in [0, 2] {
            let report = results[index].1.as_ref().unwrap();
            assert!((report.bpm - 120.0).abs() < 2.0, "bpm {}", report.bpm);
        }

        let entries = read_trace_file(writer.path()).unwrap();
        let progress: Vec<f32> = entries
            .iter()
            .filter(|e| e.stage == "files")
            .map(|e| e.progress)
            .collect();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[2], 1.0);

        let finished = entries
            .iter()
            .find(|e| e.stage == "rhythm" && e.status == TraceStatus::Completed)
            .unwrap();
        let data = finished.data.as_ref().unwrap();
        assert!(data["bpm"].as_f64().is_some());
        assert!(entries
            .iter()
            .filter(|e| e.stage == "load" && e.status == TraceStatus::Completed)
            .all(|e| e.data.is_none()));
    }

    #[test]
    fn test_wav_bytes_analysis() {
        let registry = Registry::with_builtins().unwrap();
        let mut bytes = Vec::new();
        write_wav(std::io::Cursor::new(&mut bytes), &click_track(44100, 22050, 6));

        let report = analyze_wav_bytes(&registry, &bytes, 44100.0).unwrap();
        assert!((report.bpm - 120.0).abs() < 2.0, "bpm {}", report.bpm);

        let err = analyze_wav_bytes(&registry, &bytes, 48000.0).unwrap_err();
        assert!(err.to_string().contains("resampling"));
        assert!(analyze_wav_bytes(&registry, b"not a wav", 44100.0).is_err());
    }

    #[test]
    fn test_report_serializes() {
        let report = RhythmReport {
            bpm: 120.0,
            confidence: 0.5,
            ticks: vec![0.5, 1.0],
            estimates: vec![120.0],
            bpm_intervals: vec![0.5],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"bpm_intervals\":[0.5]"));
    }
}
