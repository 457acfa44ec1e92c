// Streaming algorithm contract
// Declared consumption/production rates let the scheduler decide readiness

use crate::error::{EngineError, EngineResult};
use crate::registry::PortSpec;
use crate::types::Value;

/// How many tokens an input needs before `process` may run, and how many
/// are dropped afterwards (frame size / hop size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    pub acquire: usize,
    pub release: usize,
}

impl Consumption {
    /// One token in, one token consumed
    pub const fn single() -> Self {
        Consumption {
            acquire: 1,
            release: 1,
        }
    }

    pub const fn window(acquire: usize, release: usize) -> Self {
        Consumption { acquire, release }
    }

    pub fn is_valid(&self) -> bool {
        self.acquire >= 1 && self.release >= 1 && self.release <= self.acquire
    }
}

/// Result of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// More work may follow
    Continue,
    /// This algorithm will produce nothing more; the scheduler finishes it
    Exhausted,
}

/// A streaming processing unit.
///
/// The scheduler calls `process` only when every input holds at least
/// `consumption(i).acquire` tokens and every connected output has room for
/// `production(j)` more. `finish` runs exactly once, after the inputs reach
/// end-of-stream (or after `process` reports `Flow::Exhausted`); its context
/// exposes whatever tokens are left, and its pushes are not rate limited.
/// A node whose consumers have all finished is retired without `finish`.
/// `commit` runs once per node after the whole run has succeeded.
pub trait StreamingAlgorithm: Send {
    fn consumption(&self, _input: usize) -> Consumption {
        Consumption::single()
    }

    /// Upper bound on tokens pushed to an output by one `process` call
    fn production(&self, _output: usize) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut StreamContext<'_>) -> EngineResult<Flow>;

    fn finish(&mut self, _ctx: &mut StreamContext<'_>) -> EngineResult<()> {
        Ok(())
    }

    /// Make results staged by `finish` visible outside the network
    fn commit(&mut self) {}

    fn reset(&mut self) {}
}

/// Token windows and output staging for one `process`/`finish` call
pub struct StreamContext<'a> {
    algorithm: &'a str,
    input_specs: &'a [PortSpec],
    output_specs: &'a [PortSpec],
    inputs: Vec<&'a [Value]>,
    outputs: Vec<Vec<Value>>,
    limits: Vec<usize>,
    finishing: bool,
}

impl<'a> StreamContext<'a> {
    pub(crate) fn new(
        algorithm: &'a str,
        input_specs: &'a [PortSpec],
        output_specs: &'a [PortSpec],
        inputs: Vec<&'a [Value]>,
        limits: Vec<usize>,
        finishing: bool,
    ) -> Self {
        StreamContext {
            algorithm,
            input_specs,
            output_specs,
            inputs,
            outputs: vec![Vec::new(); output_specs.len()],
            limits,
            finishing,
        }
    }

    pub fn algorithm(&self) -> &'a str {
        self.algorithm
    }

    pub fn input_specs(&self) -> &'a [PortSpec] {
        self.input_specs
    }

    pub fn output_specs(&self) -> &'a [PortSpec] {
        self.output_specs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Tokens available on an input for this call
    pub fn input(&self, index: usize) -> &'a [Value] {
        self.inputs.get(index).copied().unwrap_or(&[])
    }

    pub fn input_named(&self, name: &str) -> EngineResult<&'a [Value]> {
        self.input_specs
            .iter()
            .position(|spec| spec.name == name)
            .map(|index| self.input(index))
            .ok_or_else(|| EngineError::unknown_port(self.algorithm, name))
    }

    /// Input tokens of a real-valued stream
    pub fn reals(&self, index: usize) -> EngineResult<Vec<f32>> {
        self.input(index)
            .iter()
            .map(|token| {
                token
                    .as_real()
                    .ok_or_else(|| self.fail(format!("expected real tokens, found {}", token.data_type())))
            })
            .collect()
    }

    /// Whether this context belongs to the end-of-stream `finish` call
    pub fn is_finishing(&self) -> bool {
        self.finishing
    }

    /// Stage a token on an output port
    pub fn push(&mut self, index: usize, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        let spec = self
            .output_specs
            .get(index)
            .ok_or_else(|| self.fail(format!("no output at index {}", index)))?;
        if value.data_type() != spec.data_type {
            return Err(EngineError::TypeMismatch {
                port: spec.name.to_string(),
                expected: spec.data_type,
                found: value.data_type(),
            });
        }
        if !self.finishing && self.outputs[index].len() >= self.limits[index] {
            return Err(self.fail(format!(
                "produced more than {} tokens on '{}'",
                self.limits[index], spec.name
            )));
        }
        self.outputs[index].push(value);
        Ok(())
    }

    pub fn push_named(&mut self, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        let index = self
            .output_specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| EngineError::unknown_port(self.algorithm, name))?;
        self.push(index, value)
    }

    pub fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::computation(self.algorithm, message)
    }

    pub(crate) fn into_outputs(self) -> Vec<Vec<Value>> {
        self.outputs
    }
}
