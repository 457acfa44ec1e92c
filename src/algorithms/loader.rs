// MonoLoader
// Reads a WAV file into a mono sample buffer at a fixed sample rate

use log::debug;

use crate::audio::ingest_wav_file;
use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::{EngineError, EngineResult};
use crate::registry::{BatchDescriptor, ParameterSpec, Parameters, RegistryBuilder, StreamingDescriptor};
use crate::streaming::{Flow, StreamContext, StreamingAlgorithm};
use crate::types::DataType;

const NAME: &str = "MonoLoader";

/// Samples pushed per streaming `process` call
const STREAM_CHUNK: usize = 4096;

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    builder.register_batch(
        BatchDescriptor::new(NAME, create_batch)
            .category("io")
            .describe("Loads an audio file and mixes it down to mono")
            .parameter(
                ParameterSpec::string("filename")
                    .default_value("")
                    .describe("path to a WAV file"),
            )
            .parameter(
                ParameterSpec::real("sampleRate")
                    .default_value(44100.0)
                    .positive()
                    .describe("expected sample rate in Hz"),
            )
            .output("audio", DataType::RealVector),
    )?;

    builder.register_streaming(
        StreamingDescriptor::new(NAME, create_streaming)
            .category("io")
            .describe("Streams an audio file as mono samples")
            .parameter(ParameterSpec::string("filename"))
            .parameter(ParameterSpec::real("sampleRate").positive())
            .output("audio", DataType::Real)
            .equivalent_to(NAME),
    )
}

struct Source {
    filename: String,
    sample_rate: f32,
}

impl Source {
    fn from_parameters(params: &Parameters) -> EngineResult<Self> {
        Ok(Source {
            filename: params.string("filename")?,
            sample_rate: params.real("sampleRate")?,
        })
    }

    fn load(&self) -> EngineResult<Vec<f32>> {
        if self.filename.is_empty() {
            return Err(EngineError::computation(NAME, "no filename given"));
        }
        let audio = ingest_wav_file(&self.filename)
            .map_err(|e| EngineError::computation(NAME, format!("{}: {}", self.filename, e)))?;
        if audio.sample_rate as f32 != self.sample_rate {
            return Err(EngineError::computation(
                NAME,
                format!(
                    "{} is sampled at {} Hz, expected {} Hz (resampling is not supported)",
                    self.filename, audio.sample_rate, self.sample_rate
                ),
            ));
        }
        debug!(
            "Loaded {} ({} frames, {} channels)",
            self.filename, audio.frame_count, audio.channels
        );
        Ok(audio.to_mono())
    }
}

struct MonoLoader {
    source: Source,
}

fn create_batch(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(MonoLoader {
        source: Source::from_parameters(params)?,
    }))
}

impl Algorithm for MonoLoader {
    fn compute(&mut self, _inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        outputs.set("audio", self.source.load()?)
    }
}

/// Streaming loader; the file is read on the first `process` call
struct StreamingMonoLoader {
    source: Source,
    samples: Option<Vec<f32>>,
    position: usize,
}

fn create_streaming(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(StreamingMonoLoader {
        source: Source::from_parameters(params)?,
        samples: None,
        position: 0,
    }))
}

impl StreamingAlgorithm for StreamingMonoLoader {
    fn production(&self, _output: usize) -> usize {
        STREAM_CHUNK
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        if self.samples.is_none() {
            self.samples = Some(self.source.load()?);
        }
        let Some(samples) = &self.samples else {
            return Ok(Flow::Exhausted);
        };
        let end = (self.position + STREAM_CHUNK).min(samples.len());
        for &sample in &samples[self.position..end] {
            ctx.push(0, sample)?;
        }
        self.position = end;
        Ok(if end == samples.len() {
            Flow::Exhausted
        } else {
            Flow::Continue
        })
    }

    fn reset(&mut self) {
        self.samples = None;
        self.position = 0;
    }
}
