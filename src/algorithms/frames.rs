// FrameCutter
// Slices a signal into fixed-size, hop-spaced frames

use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::EngineResult;
use crate::registry::{BatchDescriptor, ParameterSpec, Parameters, RegistryBuilder, StreamingDescriptor};
use crate::streaming::{Consumption, Flow, StreamContext, StreamingAlgorithm};
use crate::types::DataType;

const NAME: &str = "FrameCutter";

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    builder.register_batch(
        BatchDescriptor::new(NAME, create_batch)
            .category("standard")
            .describe("Returns the next frame of the input signal on each call")
            .parameter(ParameterSpec::integer("frameSize").default_value(1024).at_least(1.0))
            .parameter(ParameterSpec::integer("hopSize").default_value(512).at_least(1.0))
            .parameter(
                ParameterSpec::boolean("lastFrameToEndOfFile")
                    .default_value(false)
                    .describe("zero-pad frames that run past the end of the signal"),
            )
            .input("signal", DataType::RealVector)
            .output("frame", DataType::RealVector),
    )?;

    builder.register_streaming(
        StreamingDescriptor::new(NAME, create_streaming)
            .category("standard")
            .describe("Cuts a sample stream into frames")
            .parameter(ParameterSpec::integer("frameSize").at_least(1.0))
            .parameter(ParameterSpec::integer("hopSize").at_least(1.0))
            .parameter(ParameterSpec::boolean("lastFrameToEndOfFile"))
            .input("signal", DataType::Real)
            .output("frame", DataType::RealVector)
            .equivalent_to(NAME),
    )
}

#[derive(Debug, Clone, Copy)]
struct Framing {
    frame_size: usize,
    hop_size: usize,
    last_frame_to_end: bool,
}

impl Framing {
    fn from_parameters(params: &Parameters) -> EngineResult<Self> {
        Ok(Framing {
            frame_size: params.size("frameSize")?,
            hop_size: params.size("hopSize")?,
            last_frame_to_end: params.boolean("lastFrameToEndOfFile")?,
        })
    }

    /// Frame starting at `start`, zero padded past the end when allowed
    fn frame_at(&self, signal: &[f32], start: usize) -> Option<Vec<f32>> {
        if start >= signal.len() {
            return None;
        }
        let end = start + self.frame_size;
        if end <= signal.len() {
            return Some(signal[start..end].to_vec());
        }
        if !self.last_frame_to_end {
            return None;
        }
        let mut frame = signal[start..].to_vec();
        frame.resize(self.frame_size, 0.0);
        Some(frame)
    }
}

struct FrameCutter {
    framing: Framing,
    position: usize,
}

fn create_batch(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(FrameCutter {
        framing: Framing::from_parameters(params)?,
        position: 0,
    }))
}

impl Algorithm for FrameCutter {
    /// Emits an empty frame once the signal is used up
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let signal = inputs.real_vector("signal")?;
        match self.framing.frame_at(signal, self.position) {
            Some(frame) => {
                self.position += self.framing.hop_size;
                outputs.set("frame", frame)
            }
            None => outputs.set("frame", Vec::<f32>::new()),
        }
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

struct StreamingFrameCutter {
    framing: Framing,
}

fn create_streaming(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(StreamingFrameCutter {
        framing: Framing::from_parameters(params)?,
    }))
}

impl StreamingAlgorithm for StreamingFrameCutter {
    fn consumption(&self, _input: usize) -> Consumption {
        let framing = &self.framing;
        Consumption::window(framing.frame_size.max(framing.hop_size), framing.hop_size)
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        let window = ctx.reals(0)?;
        ctx.push(0, window[..self.framing.frame_size].to_vec())?;
        Ok(Flow::Continue)
    }

    /// Frames that fit in the leftover samples
    fn finish(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<()> {
        let leftover = ctx.reals(0)?;
        let mut start = 0;
        while let Some(frame) = self.framing.frame_at(&leftover, start) {
            ctx.push(0, frame)?;
            start += self.framing.hop_size;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParameterMap, Registry};
    use crate::streaming::{Network, VectorInput, VectorOutput};
    use crate::types::Slot;

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        register(&mut builder).unwrap();
        builder.build().unwrap()
    }

    fn batch_frames(registry: &Registry, params: &ParameterMap, signal: &[f32]) -> Vec<Vec<f32>> {
        let mut cutter = registry.create(NAME, params).unwrap();
        let input = Slot::new(signal.to_vec());
        let output = Slot::of(DataType::RealVector);
        cutter.bind_input("signal", &input).unwrap();
        cutter.bind_output("frame", &output).unwrap();

        let mut frames = Vec::new();
        loop {
            cutter.compute().unwrap();
            let frame = output.real_vector().unwrap();
            if frame.is_empty() {
                break;
            }
            frames.push(frame);
        }
        frames
    }

    fn streamed_frames(registry: &Registry, params: &ParameterMap, signal: &[f32]) -> Vec<Vec<f32>> {
        let result = Slot::of(DataType::RealMatrix);
        let mut network = Network::new();
        let source = network.add("source", VectorInput::reals(signal)).unwrap();
        let cutter = network
            .add("cutter", registry.create_streaming(NAME, params).unwrap())
            .unwrap();
        let sink = network.add("sink", VectorOutput::instance(&result).unwrap()).unwrap();
        network.chain(&[source, cutter, sink]).unwrap();
        network.run().unwrap();
        match result.get() {
            crate::types::Value::RealMatrix(frames) => frames,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_frames_and_reset() {
        let registry = registry();
        let signal: Vec<f32> = (1..=10).map(|i| i as f32).collect();
        let params = ParameterMap::new().with("frameSize", 4).with("hopSize", 2);

        let frames = batch_frames(&registry, &params, &signal);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[3], vec![7.0, 8.0, 9.0, 10.0]);

        let padded = batch_frames(&registry, &params.clone().with("lastFrameToEndOfFile", true), &signal);
        assert_eq!(padded.len(), 5);
        assert_eq!(padded[4], vec![9.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_streaming_matches_batch() {
        let registry = registry();
        let signal: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.1).sin()).collect();
        for (frame, hop, last) in [(64, 32, false), (64, 32, true), (16, 40, false), (16, 40, true), (50, 50, true)] {
            let params = ParameterMap::new()
                .with("frameSize", frame)
                .with("hopSize", hop)
                .with("lastFrameToEndOfFile", last);
            assert_eq!(
                streamed_frames(&registry, &params, &signal),
                batch_frames(&registry, &params, &signal),
                "frame {} hop {} last {}",
                frame,
                hop,
                last
            );
        }
    }

    #[test]
    fn test_short_stream_yields_no_frames() {
        let registry = registry();
        let params = ParameterMap::new().with("frameSize", 8).with("hopSize", 8);
        assert!(streamed_frames(&registry, &params, &[1.0, 2.0]).is_empty());
    }
}
