// Algorithm descriptors
// Static metadata: name, parameter schema, port schema and constructor

use crate::batch::Algorithm;
use crate::error::EngineResult;
use crate::streaming::StreamingAlgorithm;
use crate::types::DataType;

use super::parameter::{ParameterSpec, Parameters};

/// Declared port: name plus the type every binding must match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub data_type: DataType,
}

impl PortSpec {
    pub const fn new(name: &'static str, data_type: DataType) -> Self {
        PortSpec { name, data_type }
    }
}

/// Constructor invoked by the factory with validated parameters
pub type Constructor<A> = fn(&Parameters) -> EngineResult<Box<A>>;

/// Immutable description of a constructible algorithm.
///
/// `A` is the trait object the constructor yields: [`Algorithm`] for batch
/// descriptors, [`StreamingAlgorithm`] for streaming ones. A streaming
/// descriptor may name an equivalent batch algorithm; at registration the
/// parameter defaults it leaves out are taken from that batch schema.
pub struct Descriptor<A: ?Sized> {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Name of the batch algorithm this one mirrors
    pub equivalent: Option<&'static str>,
    /// Copy every batch parameter not declared here when resolving the link
    pub inherit_parameters: bool,
    pub constructor: Constructor<A>,
}

pub type BatchDescriptor = Descriptor<dyn Algorithm>;
pub type StreamingDescriptor = Descriptor<dyn StreamingAlgorithm>;

impl<A: ?Sized> Descriptor<A> {
    pub fn new(name: &'static str, constructor: Constructor<A>) -> Self {
        Descriptor {
            name,
            category: "",
            description: "",
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            equivalent: None,
            inherit_parameters: false,
            constructor,
        }
    }

    pub fn category(mut self, category: &'static str) -> Self {
        self.category = category;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn input(mut self, name: &'static str, data_type: DataType) -> Self {
        self.inputs.push(PortSpec::new(name, data_type));
        self
    }

    pub fn output(mut self, name: &'static str, data_type: DataType) -> Self {
        self.outputs.push(PortSpec::new(name, data_type));
        self
    }

    /// Link to the batch algorithm sharing this algorithm's defaults
    pub fn equivalent_to(mut self, batch_name: &'static str) -> Self {
        self.equivalent = Some(batch_name);
        self
    }

    /// Link to a batch algorithm and take its whole parameter schema
    pub fn inherits(mut self, batch_name: &'static str) -> Self {
        self.equivalent = Some(batch_name);
        self.inherit_parameters = true;
        self
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }

    pub fn parameter_spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl<A: ?Sized> std::fmt::Debug for Descriptor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("parameters", &self.parameters.len())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("equivalent", &self.equivalent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Inputs, Outputs};
    use crate::error::EngineError;

    struct Nothing;

    impl Algorithm for Nothing {
        fn compute(&mut self, _inputs: &Inputs<'_>, _outputs: &mut Outputs<'_>) -> EngineResult<()> {
            Ok(())
        }
    }

    fn make(_params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
        Ok(Box::new(Nothing))
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = BatchDescriptor::new("Nothing", make)
            .category("test")
            .input("signal", DataType::RealVector)
            .output("mean", DataType::Real)
            .parameter(ParameterSpec::real("gain").default_value(1.0));

        assert_eq!(descriptor.input_index("signal"), Some(0));
        assert_eq!(descriptor.output_index("mean"), Some(0));
        assert_eq!(descriptor.output_index("signal"), None);
        assert!(descriptor.parameter_spec("gain").is_some());
        assert!(descriptor.equivalent.is_none());
    }

    #[test]
    fn test_constructor_is_callable() {
        let descriptor = BatchDescriptor::new("Nothing", make);
        let params = Parameters::resolve("Nothing", &[], &Default::default()).unwrap();
        let result: Result<_, EngineError> = (descriptor.constructor)(&params);
        assert!(result.is_ok());
    }
}
