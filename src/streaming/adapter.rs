// Batch-to-streaming adapters
// Run a batch algorithm per token, or once over an accumulated stream

use std::mem;
use std::sync::Arc;

use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::EngineResult;
use crate::registry::PortSpec;
use crate::types::{DataType, Value};

use super::algorithm::{Flow, StreamContext, StreamingAlgorithm};

/// Streams a batch algorithm one token per port per call.
///
/// The streaming descriptor must declare the same ports as the batch one.
pub struct BatchAdapter {
    inner: Box<dyn Algorithm>,
}

impl BatchAdapter {
    pub fn new(inner: Box<dyn Algorithm>) -> Self {
        BatchAdapter { inner }
    }
}

impl StreamingAlgorithm for BatchAdapter {
    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        let values: Vec<Arc<Value>> = (0..ctx.input_count())
            .map(|port| {
                ctx.input(port)
                    .first()
                    .cloned()
                    .map(Arc::new)
                    .ok_or_else(|| ctx.fail("input window is empty"))
            })
            .collect::<EngineResult<_>>()?;

        let inputs = Inputs::new(ctx.algorithm(), ctx.input_specs(), &values);
        let mut outputs = Outputs::new(ctx.algorithm(), ctx.output_specs());
        self.inner.compute(&inputs, &mut outputs)?;
        for (port, value) in outputs.into_values()?.into_iter().enumerate() {
            ctx.push(port, value)?;
        }
        Ok(Flow::Continue)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Collects a real-valued stream and runs a batch algorithm once over the
/// whole of it at end-of-stream.
///
/// The batch algorithm sees the stream as a `vector_real` on an input of the
/// same name; each of its outputs becomes exactly one token.
pub struct AccumulatorAdapter {
    inner: Box<dyn Algorithm>,
    collected: Vec<f32>,
}

impl AccumulatorAdapter {
    pub fn new(inner: Box<dyn Algorithm>) -> Self {
        AccumulatorAdapter {
            inner,
            collected: Vec::new(),
        }
    }
}

impl StreamingAlgorithm for AccumulatorAdapter {
    fn production(&self, _output: usize) -> usize {
        0
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        self.collected.extend(ctx.reals(0)?);
        Ok(Flow::Continue)
    }

    fn finish(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<()> {
        self.collected.extend(ctx.reals(0)?);
        let name = ctx
            .input_specs()
            .first()
            .map(|spec| spec.name)
            .ok_or_else(|| ctx.fail("accumulator has no input"))?;
        let specs = [PortSpec::new(name, DataType::RealVector)];
        let values = [Arc::new(Value::RealVector(mem::take(&mut self.collected)))];

        let inputs = Inputs::new(ctx.algorithm(), &specs, &values);
        let mut outputs = Outputs::new(ctx.algorithm(), ctx.output_specs());
        self.inner.compute(&inputs, &mut outputs)?;
        for (port, value) in outputs.into_values()?.into_iter().enumerate() {
            ctx.push(port, value)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.collected.clear();
        self.inner.reset();
    }
}
