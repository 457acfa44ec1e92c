// Streaming instance
// A constructed streaming algorithm waiting to be placed in a network

use std::sync::Arc;

use crate::registry::{Parameters, StreamingDescriptor};

use super::algorithm::{Consumption, StreamingAlgorithm};

/// A live streaming algorithm plus the descriptor it was built from.
///
/// Ports are connected through a [`Network`](super::Network), which takes
/// ownership of the instance.
pub struct StreamingInstance {
    pub(crate) descriptor: Arc<StreamingDescriptor>,
    pub(crate) parameters: Parameters,
    pub(crate) algorithm: Box<dyn StreamingAlgorithm>,
}

impl StreamingInstance {
    pub(crate) fn new(
        descriptor: Arc<StreamingDescriptor>,
        parameters: Parameters,
        algorithm: Box<dyn StreamingAlgorithm>,
    ) -> Self {
        StreamingInstance {
            descriptor,
            parameters,
            algorithm,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &StreamingDescriptor {
        &self.descriptor
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn input_names(&self) -> Vec<&'static str> {
        self.descriptor.inputs.iter().map(|p| p.name).collect()
    }

    pub fn output_names(&self) -> Vec<&'static str> {
        self.descriptor.outputs.iter().map(|p| p.name).collect()
    }

    pub fn consumption(&self, input: usize) -> Consumption {
        self.algorithm.consumption(input)
    }

    pub fn production(&self, output: usize) -> usize {
        self.algorithm.production(output)
    }

    pub fn reset(&mut self) {
        self.algorithm.reset();
    }
}

impl std::fmt::Debug for StreamingInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingInstance")
            .field("name", &self.descriptor.name)
            .field("inputs", &self.input_names())
            .field("outputs", &self.output_names())
            .finish()
    }
}
