// Batch instance and executor
// Configured -> Bound -> compute (re-enterable), over caller-owned slots

use std::sync::Arc;

use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::registry::{BatchDescriptor, Parameters};
use crate::types::{Slot, Value};

use super::algorithm::{Algorithm, Inputs, Outputs};

/// Lifecycle state of a batch instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstanceState {
    /// Constructed; at least one port is unbound
    Configured,
    /// Every input and output port has a binding; `compute` may run
    Bound,
}

/// A live batch algorithm with its port bindings.
///
/// The instance exclusively owns its algorithm state; dropping it releases
/// everything. Slots bound to it stay owned by the caller.
pub struct Instance {
    descriptor: Arc<BatchDescriptor>,
    parameters: Parameters,
    algorithm: Box<dyn Algorithm>,
    inputs: Vec<Option<Slot>>,
    outputs: Vec<Option<Slot>>,
    invocations: u64,
}

impl Instance {
    pub(crate) fn new(
        descriptor: Arc<BatchDescriptor>,
        parameters: Parameters,
        algorithm: Box<dyn Algorithm>,
    ) -> Self {
        let inputs = vec![None; descriptor.inputs.len()];
        let outputs = vec![None; descriptor.outputs.len()];
        Instance {
            descriptor,
            parameters,
            algorithm,
            inputs,
            outputs,
            invocations: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &BatchDescriptor {
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

    /// Number of successful compute calls so far
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn state(&self) -> InstanceState {
        if self.inputs.iter().chain(&self.outputs).all(Option::is_some) {
            InstanceState::Bound
        } else {
            InstanceState::Configured
        }
    }

    /// Bind caller storage as the source of an input port
    pub fn bind_input(&mut self, port: &str, source: &Slot) -> EngineResult<()> {
        let index = self
            .descriptor
            .input_index(port)
            .ok_or_else(|| EngineError::unknown_port(self.descriptor.name, port))?;
        check_binding(port, self.descriptor.inputs[index].data_type, source)?;
        self.inputs[index] = Some(source.clone());
        Ok(())
    }

    /// Bind caller storage as the destination of an output port
    pub fn bind_output(&mut self, port: &str, destination: &Slot) -> EngineResult<()> {
        let index = self
            .descriptor
            .output_index(port)
            .ok_or_else(|| EngineError::unknown_port(self.descriptor.name, port))?;
        check_binding(port, self.descriptor.outputs[index].data_type, destination)?;
        self.outputs[index] = Some(destination.clone());
        Ok(())
    }

    /// Run the algorithm once over the currently bound inputs.
    ///
    /// Outputs are written only when the whole computation succeeds; on
    /// error every bound output keeps its previous value.
    pub fn compute(&mut self) -> EngineResult<()> {
        let name = self.descriptor.name;
        let mut values = Vec::with_capacity(self.inputs.len());
        for (spec, binding) in self.descriptor.inputs.iter().zip(&self.inputs) {
            let slot = binding.as_ref().ok_or_else(|| {
                EngineError::computation(name, format!("input '{}' is not bound", spec.name))
            })?;
            let value = slot.snapshot();
            values.push(value);
        }
        if let Some(spec) = self
            .descriptor
            .outputs
            .iter()
            .zip(&self.outputs)
            .find_map(|(spec, binding)| binding.is_none().then_some(spec))
        {
            return Err(EngineError::computation(
                name,
                format!("output '{}' is not bound", spec.name),
            ));
        }

        let inputs = Inputs::new(name, &self.descriptor.inputs, &values);
        let mut outputs = Outputs::new(name, &self.descriptor.outputs);
        self.algorithm.compute(&inputs, &mut outputs)?;
        let produced = outputs.into_values()?;

        for (slot, value) in self.outputs.iter().flatten().zip(produced) {
            slot.store(Arc::new(value));
        }
        self.invocations += 1;
        Ok(())
    }

    /// Clear algorithm state kept between compute calls; bindings stay
    pub fn reset(&mut self) {
        self.algorithm.reset();
    }

    /// Current value of a bound output, if any
    pub fn output_value(&self, port: &str) -> Option<Value> {
        let index = self.descriptor.output_index(port)?;
        self.outputs[index].as_ref().map(Slot::get)
    }
}

fn check_binding(port: &str, expected: crate::types::DataType, slot: &Slot) -> EngineResult<()> {
    if slot.data_type() != expected {
        return Err(EngineError::TypeMismatch {
            port: port.to_string(),
            expected,
            found: slot.data_type(),
        });
    }
    Ok(())
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.descriptor.name)
            .field("state", &self.state())
            .field("invocations", &self.invocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParameterMap, Registry};
    use crate::types::DataType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sums its input and remembers a running total across calls
    struct RunningSum {
        total: f32,
    }

    impl Algorithm for RunningSum {
        fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
            let signal = inputs.real_vector("signal")?;
            if signal.is_empty() {
                return Err(inputs.fail("signal is empty"));
            }
            self.total += signal.iter().sum::<f32>();
            outputs.set("total", self.total)
        }

        fn reset(&mut self) {
            self.total = 0.0;
        }
    }

    static LIVE: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Counted {
        fn new() -> Self {
            LIVE.fetch_add(1, Ordering::SeqCst);
            Counted
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Algorithm for Counted {
        fn compute(&mut self, _: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
            outputs.set("value", 1.0f32)
        }
    }

    fn running_sum(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
        Ok(Box::new(RunningSum { total: 0.0 }))
    }

    fn counted(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
        Ok(Box::new(Counted::new()))
    }

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .register_batch(
                BatchDescriptor::new("RunningSum", running_sum)
                    .input("signal", DataType::RealVector)
                    .output("total", DataType::Real),
            )
            .unwrap();
        builder
            .register_batch(BatchDescriptor::new("Counted", counted).output("value", DataType::Real))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let registry = registry();
        let mut instance = registry.create("RunningSum", &ParameterMap::new()).unwrap();
        assert_eq!(instance.state(), InstanceState::Configured);

        let signal = Slot::new(vec![1.0f32, 2.0]);
        let total = Slot::of(DataType::Real);
        instance.bind_input("signal", &signal).unwrap();
        assert_eq!(instance.state(), InstanceState::Configured);
        assert!(instance.compute().is_err());

        instance.bind_output("total", &total).unwrap();
        assert_eq!(instance.state(), InstanceState::Bound);

        instance.compute().unwrap();
        assert_eq!(total.real(), Some(3.0));
        assert_eq!(instance.state(), InstanceState::Bound);

        // Re-enterable, with the input mutated in place between calls
        signal.set(vec![10.0f32]).unwrap();
        instance.compute().unwrap();
        assert_eq!(total.real(), Some(13.0));
        assert_eq!(instance.invocations(), 2);
    }

    #[test]
    fn test_binding_errors() {
        let registry = registry();
        let mut instance = registry.create("RunningSum", &ParameterMap::new()).unwrap();

        let scalar = Slot::new(1.0f32);
        let err = instance.bind_input("signal", &scalar).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));

        let err = instance.bind_input("audio", &Slot::of(DataType::RealVector)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPort { .. }));

        // Output names are not input names
        let err = instance.bind_input("total", &scalar).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPort { .. }));
    }

    #[test]
    fn test_failed_compute_leaves_outputs_untouched() {
        let registry = registry();
        let mut instance = registry.create("RunningSum", &ParameterMap::new()).unwrap();
        let signal = Slot::new(vec![2.0f32]);
        let total = Slot::of(DataType::Real);
        instance.bind_input("signal", &signal).unwrap();
        instance.bind_output("total", &total).unwrap();
        instance.compute().unwrap();

        signal.set(Vec::<f32>::new()).unwrap();
        let err = instance.compute().unwrap_err();
        assert!(matches!(err, EngineError::Computation { .. }));
        assert_eq!(total.real(), Some(2.0));
        assert_eq!(instance.state(), InstanceState::Bound);
    }

    #[test]
    fn test_in_place_type_change_rejected() {
        let registry = registry();
        let mut instance = registry.create("RunningSum", &ParameterMap::new()).unwrap();
        let signal = Slot::new(vec![2.0f32]);
        let total = Slot::of(DataType::Real);
        instance.bind_input("signal", &signal).unwrap();
        instance.bind_output("total", &total).unwrap();

        let err = signal.update(|value| *value = Value::Real(1.0)).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
        instance.compute().unwrap();
        assert_eq!(total.real(), Some(2.0));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let registry = registry();
        let mut instance = registry.create("RunningSum", &ParameterMap::new()).unwrap();
        let signal = Slot::new(vec![1.5f32]);
        let total = Slot::of(DataType::Real);
        instance.bind_input("signal", &signal).unwrap();
        instance.bind_output("total", &total).unwrap();

        instance.compute().unwrap();
        let first = total.get();
        instance.reset();
        instance.compute().unwrap();
        assert_eq!(total.get(), first);
    }

    #[test]
    fn test_many_instances_released() {
        let registry = registry();
        let before = LIVE.load(Ordering::SeqCst);
        for _ in 0..10_000 {
            let instance = registry.create("Counted", &ParameterMap::new()).unwrap();
            drop(instance);
        }
        assert_eq!(LIVE.load(Ordering::SeqCst), before);
    }
}
