// Vector sources and sinks
// Bridge caller-owned data into and out of a streaming network

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::registry::{Parameters, StreamingDescriptor};
use crate::types::{DataType, Slot, Value};

use super::algorithm::{Flow, StreamContext, StreamingAlgorithm};
use super::instance::StreamingInstance;

const SOURCE_CHUNK: usize = 256;

/// Source emitting caller-supplied tokens in order, then end-of-stream
pub struct VectorInput {
    tokens: Vec<Value>,
    position: usize,
    chunk: usize,
}

impl VectorInput {
    /// Source instance for tokens of one type. Every token must match
    /// `data_type`.
    pub fn instance(data_type: DataType, tokens: Vec<Value>) -> EngineResult<StreamingInstance> {
        if let Some(token) = tokens.iter().find(|t| t.data_type() != data_type) {
            return Err(EngineError::TypeMismatch {
                port: "data".to_string(),
                expected: data_type,
                found: token.data_type(),
            });
        }
        Ok(Self::typed(data_type, tokens))
    }

    /// Source of real samples
    pub fn reals(samples: &[f32]) -> StreamingInstance {
        Self::typed(DataType::Real, samples.iter().map(|&s| Value::Real(s)).collect())
    }

    /// Source of real frames
    pub fn frames(frames: Vec<Vec<f32>>) -> StreamingInstance {
        Self::typed(
            DataType::RealVector,
            frames.into_iter().map(Value::RealVector).collect(),
        )
    }

    fn typed(data_type: DataType, tokens: Vec<Value>) -> StreamingInstance {
        let descriptor = StreamingDescriptor::new("VectorInput", empty_input)
            .category("io")
            .describe("Emits a caller-owned sequence of tokens")
            .output("data", data_type);
        StreamingInstance::new(
            Arc::new(descriptor),
            Parameters::empty("VectorInput"),
            Box::new(VectorInput {
                tokens,
                position: 0,
                chunk: SOURCE_CHUNK,
            }),
        )
    }
}

fn empty_input(_: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(VectorInput {
        tokens: Vec::new(),
        position: 0,
        chunk: SOURCE_CHUNK,
    }))
}

impl StreamingAlgorithm for VectorInput {
    fn production(&self, _output: usize) -> usize {
        self.chunk
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        let end = (self.position + self.chunk).min(self.tokens.len());
        for token in &self.tokens[self.position..end] {
            ctx.push(0, token.clone())?;
        }
        self.position = end;
        if self.position == self.tokens.len() {
            Ok(Flow::Exhausted)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Sink collecting a stream into a caller-owned slot.
///
/// A `vector_real` slot collects real tokens; a `matrix_real` slot collects
/// `vector_real` tokens. The collected value is staged at end of stream and
/// written to the slot only once the whole run succeeds, so a failed or
/// cancelled run leaves it untouched.
pub struct VectorOutput {
    slot: Slot,
    collected: Vec<Value>,
    staged: Option<Value>,
}

impl VectorOutput {
    pub fn instance(slot: &Slot) -> EngineResult<StreamingInstance> {
        let token_type = match slot.data_type() {
            DataType::RealVector => DataType::Real,
            DataType::RealMatrix => DataType::RealVector,
            other => {
                return Err(EngineError::TypeMismatch {
                    port: "data".to_string(),
                    expected: DataType::RealVector,
                    found: other,
                })
            }
        };
        let descriptor = StreamingDescriptor::new("VectorOutput", unbound_output)
            .category("io")
            .describe("Collects a stream into caller-owned storage")
            .input("data", token_type);
        Ok(StreamingInstance::new(
            Arc::new(descriptor),
            Parameters::empty("VectorOutput"),
            Box::new(VectorOutput {
                slot: slot.clone(),
                collected: Vec::new(),
                staged: None,
            }),
        ))
    }

    fn publish(&mut self) -> Value {
        let tokens = std::mem::take(&mut self.collected);
        match self.slot.data_type() {
            DataType::RealMatrix => Value::RealMatrix(
                tokens
                    .into_iter()
                    .filter_map(|t| match t {
                        Value::RealVector(frame) => Some(frame),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Value::RealVector(tokens.iter().filter_map(Value::as_real).collect()),
        }
    }
}

fn unbound_output(_: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Err(EngineError::computation(
        "VectorOutput",
        "needs a caller slot; use VectorOutput::instance",
    ))
}

impl StreamingAlgorithm for VectorOutput {
    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow> {
        self.collected.extend(ctx.input(0).iter().cloned());
        Ok(Flow::Continue)
    }

    fn finish(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<()> {
        self.collected.extend(ctx.input(0).iter().cloned());
        self.staged = Some(self.publish());
        Ok(())
    }

    fn commit(&mut self) {
        if let Some(value) = self.staged.take() {
            self.slot.store(Arc::new(value));
        }
    }

    fn reset(&mut self) {
        self.collected.clear();
        self.staged = None;
    }
}
