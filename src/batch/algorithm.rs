// Batch algorithm contract
// An algorithm reads its inputs by port name and writes every declared output

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::registry::PortSpec;
use crate::types::{DataType, Value};

/// A batch processing unit.
///
/// `compute` receives read-only views of the bound inputs and must set every
/// declared output. State kept between calls (running buffers, frame
/// positions) lives in the implementing type; `reset` clears it.
pub trait Algorithm: Send {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()>;

    fn reset(&mut self) {}
}

/// Input values for one compute call
pub struct Inputs<'a> {
    algorithm: &'a str,
    specs: &'a [PortSpec],
    values: &'a [Arc<Value>],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(algorithm: &'a str, specs: &'a [PortSpec], values: &'a [Arc<Value>]) -> Self {
        debug_assert_eq!(specs.len(), values.len());
        Inputs {
            algorithm,
            specs,
            values,
        }
    }

    pub fn get(&self, name: &str) -> EngineResult<&'a Value> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .map(|index| &*self.values[index])
            .ok_or_else(|| EngineError::unknown_port(self.algorithm, name))
    }

    fn typed<T>(&self, name: &str, expected: DataType, extract: impl FnOnce(&'a Value) -> Option<T>) -> EngineResult<T> {
        let value = self.get(name)?;
        extract(value).ok_or_else(|| EngineError::TypeMismatch {
            port: name.to_string(),
            expected,
            found: value.data_type(),
        })
    }

    pub fn real(&self, name: &str) -> EngineResult<f32> {
        self.typed(name, DataType::Real, Value::as_real)
    }

    pub fn integer(&self, name: &str) -> EngineResult<i64> {
        self.typed(name, DataType::Integer, Value::as_integer)
    }

    pub fn real_vector(&self, name: &str) -> EngineResult<&'a [f32]> {
        self.typed(name, DataType::RealVector, Value::as_real_vector)
    }

    pub fn real_matrix(&self, name: &str) -> EngineResult<&'a [Vec<f32>]> {
        self.typed(name, DataType::RealMatrix, Value::as_real_matrix)
    }

    /// Computation error attributed to this algorithm
    pub fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::computation(self.algorithm, message)
    }
}

/// Output values produced by one compute call
pub struct Outputs<'a> {
    algorithm: &'a str,
    specs: &'a [PortSpec],
    values: Vec<Option<Value>>,
}

impl<'a> Outputs<'a> {
    pub(crate) fn new(algorithm: &'a str, specs: &'a [PortSpec]) -> Self {
        Outputs {
            algorithm,
            specs,
            values: vec![None; specs.len()],
        }
    }

    /// Set a declared output; the value's type must match the port
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        let index = self
            .specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| EngineError::unknown_port(self.algorithm, name))?;
        let expected = self.specs[index].data_type;
        if value.data_type() != expected {
            return Err(EngineError::TypeMismatch {
                port: name.to_string(),
                expected,
                found: value.data_type(),
            });
        }
        self.values[index] = Some(value);
        Ok(())
    }

    /// All outputs in declaration order; fails if any was left unset
    pub(crate) fn into_values(self) -> EngineResult<Vec<Value>> {
        let algorithm = self.algorithm;
        self.values
            .into_iter()
            .zip(self.specs)
            .map(|(value, spec)| {
                value.ok_or_else(|| {
                    EngineError::computation(
                        algorithm,
                        format!("output '{}' was not produced", spec.name),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUTS: [PortSpec; 2] = [
        PortSpec::new("signal", DataType::RealVector),
        PortSpec::new("gain", DataType::Real),
    ];
    const OUTPUTS: [PortSpec; 1] = [PortSpec::new("energy", DataType::Real)];

    #[test]
    fn test_inputs_lookup() {
        let values = vec![Arc::new(Value::from(vec![1.0f32, 2.0])), Arc::new(Value::from(0.5f32))];
        let inputs = Inputs::new("Test", &INPUTS, &values);

        assert_eq!(inputs.real_vector("signal").unwrap(), &[1.0f32, 2.0]);
        assert_eq!(inputs.real("gain").unwrap(), 0.5);
        assert!(matches!(inputs.real("signal"), Err(EngineError::TypeMismatch { .. })));
        assert!(matches!(inputs.get("missing"), Err(EngineError::UnknownPort { .. })));
    }

    #[test]
    fn test_outputs_must_all_be_set() {
        let outputs = Outputs::new("Test", &OUTPUTS);
        let err = outputs.into_values().unwrap_err();
        assert!(err.to_string().contains("'energy' was not produced"));

        let mut outputs = Outputs::new("Test", &OUTPUTS);
        assert!(outputs.set("energy", vec![1.0f32]).is_err());
        outputs.set("energy", 2.0f32).unwrap();
        assert_eq!(outputs.into_values().unwrap(), vec![Value::Real(2.0)]);
    }
}
