// Algorithm factory
// Looks up a descriptor, validates parameters and constructs a fresh instance

use std::sync::Arc;

use crate::batch::Instance;
use crate::error::EngineResult;
use crate::streaming::StreamingInstance;

use super::parameter::{ParameterMap, Parameters};
use super::table::{registry, Registry};

impl Registry {
    /// Construct a batch instance. Every call returns a new, independent
    /// instance; nothing is cached or shared.
    pub fn create(&self, name: &str, parameters: &ParameterMap) -> EngineResult<Instance> {
        let descriptor = self.batch_descriptor(name)?;
        let resolved = Parameters::resolve(descriptor.name, &descriptor.parameters, parameters)?;
        let algorithm = (descriptor.constructor)(&resolved)?;
        log::debug!("Created batch instance of {}", descriptor.name);
        Ok(Instance::new(Arc::clone(descriptor), resolved, algorithm))
    }

    /// Construct a streaming instance, ready to be added to a network
    pub fn create_streaming(
        &self,
        name: &str,
        parameters: &ParameterMap,
    ) -> EngineResult<StreamingInstance> {
        let descriptor = self.streaming_descriptor(name)?;
        let resolved = Parameters::resolve(descriptor.name, &descriptor.parameters, parameters)?;
        let algorithm = (descriptor.constructor)(&resolved)?;
        log::debug!("Created streaming instance of {}", descriptor.name);
        Ok(StreamingInstance::new(Arc::clone(descriptor), resolved, algorithm))
    }
}

/// Create a batch instance from the process-wide registry
pub fn create(name: &str, parameters: &ParameterMap) -> EngineResult<Instance> {
    registry()?.create(name, parameters)
}

/// Create a streaming instance from the process-wide registry
pub fn create_streaming(name: &str, parameters: &ParameterMap) -> EngineResult<StreamingInstance> {
    registry()?.create_streaming(name, parameters)
}
