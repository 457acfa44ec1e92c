// RhythmExtractor2013
// Tempo, beat ticks and tempo candidates for a whole signal

use log::debug;

use crate::audio::{detect_onsets, OnsetConfig};
use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::{EngineError, EngineResult};
use crate::registry::{BatchDescriptor, ParameterSpec, Parameters, RegistryBuilder, StreamingDescriptor};
use crate::rhythm::{estimate_tempo, TempoConfig};
use crate::streaming::{AccumulatorAdapter, StreamingAlgorithm};
use crate::types::DataType;

const NAME: &str = "RhythmExtractor2013";

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    let outputs = [
        ("bpm", DataType::Real),
        ("ticks", DataType::RealVector),
        ("confidence", DataType::Real),
        ("estimates", DataType::RealVector),
        ("bpmIntervals", DataType::RealVector),
    ];

    let mut batch = BatchDescriptor::new(NAME, create_batch)
        .category("rhythm")
        .describe("Estimates tempo and beat positions of a signal")
        .parameter(
            ParameterSpec::integer("maxTempo")
                .default_value(208)
                .between(60.0, 250.0)
                .describe("fastest tempo considered, in BPM"),
        )
        .parameter(
            ParameterSpec::integer("minTempo")
                .default_value(40)
                .between(40.0, 180.0)
                .describe("slowest tempo considered, in BPM"),
        )
        .parameter(
            ParameterSpec::string("method")
                .default_value("multifeature")
                .choices(&["multifeature", "degara"]),
        )
        .parameter(ParameterSpec::real("sampleRate").default_value(44100.0).positive())
        .input("signal", DataType::RealVector);
    let mut streaming = StreamingDescriptor::new(NAME, create_streaming)
        .category("rhythm")
        .describe("Estimates tempo once the whole stream has arrived")
        .input("signal", DataType::Real)
        .inherits(NAME);
    for (name, data_type) in outputs {
        batch = batch.output(name, data_type);
        streaming = streaming.output(name, data_type);
    }

    builder.register_batch(batch)?;
    builder.register_streaming(streaming)
}

struct RhythmExtractor {
    tempo: TempoConfig,
    onsets: OnsetConfig,
    sample_rate: u32,
    report_confidence: bool,
}

impl RhythmExtractor {
    fn from_parameters(params: &Parameters) -> EngineResult<Self> {
        let min_tempo = params.integer("minTempo")?;
        let max_tempo = params.integer("maxTempo")?;
        if min_tempo >= max_tempo {
            return Err(EngineError::invalid_parameter(
                params.algorithm(),
                "minTempo",
                format!("must be below maxTempo ({} >= {})", min_tempo, max_tempo),
            ));
        }
        Ok(RhythmExtractor {
            tempo: TempoConfig {
                min_bpm: min_tempo as f64,
                max_bpm: max_tempo as f64,
                ..TempoConfig::default()
            },
            onsets: OnsetConfig::default(),
            sample_rate: params.real("sampleRate")?.round() as u32,
            report_confidence: params.string("method")? == "multifeature",
        })
    }
}

fn create_batch(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(RhythmExtractor::from_parameters(params)?))
}

fn create_streaming(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    let extractor = RhythmExtractor::from_parameters(params)?;
    Ok(Box::new(AccumulatorAdapter::new(Box::new(extractor))))
}

impl Algorithm for RhythmExtractor {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let signal = inputs.real_vector("signal")?;
        if signal.is_empty() {
            return Err(inputs.fail("signal is empty"));
        }
        let duration_secs = signal.len() as f64 / self.sample_rate as f64;

        let onsets = detect_onsets(signal, self.sample_rate, &self.onsets)
            .map_err(|e| inputs.fail(e.to_string()))?;
        let estimate = estimate_tempo(&onsets, &self.tempo);
        debug!(
            "{} onsets over {:.2}s, tempo {:.2} BPM",
            onsets.len(),
            duration_secs,
            estimate.bpm
        );

        let ticks: Vec<f32> = estimate
            .beat_positions_ms
            .iter()
            .map(|ms| ms / 1000.0)
            .filter(|&secs| (0.0..=duration_secs).contains(&secs))
            .map(|secs| secs as f32)
            .collect();
        let intervals: Vec<f32> = ticks.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let confidence = if self.report_confidence {
            estimate.confidence
        } else {
            0.0
        };

        outputs.set("bpm", estimate.bpm as f32)?;
        outputs.set("ticks", ticks)?;
        outputs.set("confidence", confidence)?;
        outputs.set(
            "estimates",
            estimate.candidates_bpm.iter().map(|&bpm| bpm as f32).collect::<Vec<f32>>(),
        )?;
        outputs.set("bpmIntervals", intervals)
    }
}
