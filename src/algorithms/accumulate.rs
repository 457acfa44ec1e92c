// RealAccumulator
// Streaming-only: gathers a real stream into one vector at end-of-stream

use crate::error::EngineResult;
use crate::registry::{Parameters, RegistryBuilder, StreamingDescriptor};
use crate::streaming::{Flow, StreamContext, StreamingAlgorithm};
use crate::types::DataType;

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    builder.register_streaming(
        StreamingDescriptor::new("RealAccumulator", create)
            .category("standard")
            .describe("Emits every received sample as one vector when the stream ends")
            .input("data", DataType::Real)
            .output("array", DataType::RealVector),
    )
}

#[derive(Default)]
struct RealAccumulator {
    collected: Vec<f32>,
}

fn create(_: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::<RealAccumulator>::default())
}

impl StreamingAlgorithm for RealAccumulator {
    fn production(&self, _output: usize) -> usize {
        0
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        self.collected.extend(ctx.reals(0)?);
        Ok(Flow::Continue)
    }

    /// A stream with no samples yields an empty vector
    fn finish(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<()> {
        self.collected.extend(ctx.reals(0)?);
        ctx.push(0, std::mem::take(&mut self.collected))
    }

    fn reset(&mut self) {
        self.collected.clear();
    }
}
