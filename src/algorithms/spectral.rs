// Spectral algorithms
// Windowing, magnitude spectrum and onset detection functions

use crate::audio::{high_frequency_content, spectral_flux, SpectrumAnalyzer, WindowKind};
use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::{EngineError, EngineResult};
use crate::registry::{BatchDescriptor, ParameterSpec, Parameters, RegistryBuilder, StreamingDescriptor};
use crate::streaming::{BatchAdapter, StreamingAlgorithm};
use crate::types::DataType;

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    builder.register_batch(
        BatchDescriptor::new("Windowing", create_windowing)
            .category("standard")
            .describe("Applies a window function to a frame")
            .parameter(
                ParameterSpec::string("type")
                    .default_value("hann")
                    .choices(WindowKind::NAMES),
            )
            .parameter(
                ParameterSpec::integer("zeroPadding")
                    .default_value(0)
                    .at_least(0.0)
                    .describe("zeros appended after the windowed frame"),
            )
            .input("frame", DataType::RealVector)
            .output("frame", DataType::RealVector),
    )?;
    builder.register_streaming(
        StreamingDescriptor::new("Windowing", streaming_windowing)
            .category("standard")
            .input("frame", DataType::RealVector)
            .output("frame", DataType::RealVector)
            .inherits("Windowing"),
    )?;

    builder.register_batch(
        BatchDescriptor::new("Spectrum", create_spectrum)
            .category("spectral")
            .describe("Magnitude spectrum of a frame")
            .parameter(
                ParameterSpec::integer("size")
                    .default_value(2048)
                    .at_least(2.0)
                    .describe("FFT size; frames are zero padded or truncated to it"),
            )
            .input("frame", DataType::RealVector)
            .output("spectrum", DataType::RealVector),
    )?;
    builder.register_streaming(
        StreamingDescriptor::new("Spectrum", streaming_spectrum)
            .category("spectral")
            .input("frame", DataType::RealVector)
            .output("spectrum", DataType::RealVector)
            .inherits("Spectrum"),
    )?;

    builder.register_batch(
        BatchDescriptor::new("OnsetDetection", create_onset_detection)
            .category("rhythm")
            .describe("Onset detection function value of one spectrum")
            .parameter(
                ParameterSpec::string("method")
                    .default_value("hfc")
                    .choices(&["hfc", "flux"]),
            )
            .input("spectrum", DataType::RealVector)
            .output("onsetDetection", DataType::Real),
    )?;
    builder.register_streaming(
        StreamingDescriptor::new("OnsetDetection", streaming_onset_detection)
            .category("rhythm")
            .input("spectrum", DataType::RealVector)
            .output("onsetDetection", DataType::Real)
            .inherits("OnsetDetection"),
    )
}

fn streaming_windowing(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_windowing(params)?)))
}

fn streaming_spectrum(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_spectrum(params)?)))
}

fn streaming_onset_detection(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_onset_detection(params)?)))
}

struct Windowing {
    kind: WindowKind,
    zero_padding: usize,
}

fn create_windowing(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    let name = params.string("type")?;
    let kind = WindowKind::from_name(&name)
        .ok_or_else(|| EngineError::invalid_parameter("Windowing", "type", format!("unknown window '{}'", name)))?;
    Ok(Box::new(Windowing {
        kind,
        zero_padding: params.size("zeroPadding")?,
    }))
}

impl Algorithm for Windowing {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let frame = inputs.real_vector("frame")?;
        if frame.len() < 2 {
            return Err(inputs.fail("frame must hold at least 2 samples"));
        }
        let mut windowed = Vec::with_capacity(frame.len() + self.zero_padding);
        windowed.extend_from_slice(frame);
        self.kind.apply(&mut windowed);
        windowed.resize(frame.len() + self.zero_padding, 0.0);
        outputs.set("frame", windowed)
    }
}

struct Spectrum {
    size: usize,
    analyzer: SpectrumAnalyzer,
}

fn create_spectrum(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(Spectrum {
        size: params.size("size")?,
        analyzer: SpectrumAnalyzer::new(),
    }))
}

impl Algorithm for Spectrum {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let frame = inputs.real_vector("frame")?;
        if frame.is_empty() {
            return Err(inputs.fail("cannot compute the spectrum of an empty frame"));
        }
        let spectrum = self
            .analyzer
            .magnitude(frame, self.size)
            .map_err(|e| inputs.fail(e.to_string()))?;
        outputs.set("spectrum", spectrum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OnsetMethod {
    Hfc,
    Flux,
}

struct OnsetDetection {
    method: OnsetMethod,
    previous: Vec<f32>,
}

fn create_onset_detection(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    let method = match params.string("method")?.as_str() {
        "flux" => OnsetMethod::Flux,
        _ => OnsetMethod::Hfc,
    };
    Ok(Box::new(OnsetDetection {
        method,
        previous: Vec::new(),
    }))
}

impl Algorithm for OnsetDetection {
    /// Flux compares against the previous spectrum; the first call sees none
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let spectrum = inputs.real_vector("spectrum")?;
        if spectrum.is_empty() {
            return Err(inputs.fail("spectrum is empty"));
        }
        let value = match self.method {
            OnsetMethod::Hfc => high_frequency_content(spectrum),
            OnsetMethod::Flux => {
                let flux = if self.previous.len() == spectrum.len() {
                    spectral_flux(&self.previous, spectrum)
                } else {
                    0.0
                };
                self.previous.clear();
                self.previous.extend_from_slice(spectrum);
                flux
            }
        };
        outputs.set("onsetDetection", value)
    }

    fn reset(&mut self) {
        self.previous.clear();
    }
}
