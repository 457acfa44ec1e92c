// Statistics and gain
// Energy, Mean, RMS reductions and the Scale gain stage

use crate::batch::{Algorithm, Inputs, Outputs};
use crate::error::EngineResult;
use crate::registry::{BatchDescriptor, Constructor, ParameterSpec, Parameters, RegistryBuilder, StreamingDescriptor};
use crate::streaming::{BatchAdapter, StreamingAlgorithm};
use crate::types::DataType;

/// A reduction of a non-empty vector to one real value
struct Reduction {
    output: &'static str,
    reduce: fn(&[f32]) -> f32,
}

const ENERGY: Reduction = Reduction {
    output: "energy",
    reduce: energy,
};
const MEAN: Reduction = Reduction {
    output: "mean",
    reduce: mean,
};
const RMS: Reduction = Reduction {
    output: "rms",
    reduce: rms,
};

fn energy(array: &[f32]) -> f32 {
    array.iter().map(|x| x * x).sum()
}

fn mean(array: &[f32]) -> f32 {
    array.iter().sum::<f32>() / array.len() as f32
}

fn rms(array: &[f32]) -> f32 {
    (energy(array) / array.len() as f32).sqrt()
}

impl Algorithm for Reduction {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let array = inputs.real_vector("array")?;
        if array.is_empty() {
            return Err(inputs.fail("array is empty"));
        }
        outputs.set(self.output, (self.reduce)(array))
    }
}

fn create_energy(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(ENERGY))
}

fn create_mean(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(MEAN))
}

fn create_rms(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    Ok(Box::new(RMS))
}

fn streaming_energy(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_energy(params)?)))
}

fn streaming_mean(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_mean(params)?)))
}

fn streaming_rms(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_rms(params)?)))
}

/// name, description, output port, constructors
type ReductionEntry = (
    &'static str,
    &'static str,
    &'static str,
    Constructor<dyn Algorithm>,
    Constructor<dyn StreamingAlgorithm>,
);

pub(crate) fn register(builder: &mut RegistryBuilder) -> EngineResult<()> {
    let reductions: [ReductionEntry; 3] = [
        ("Energy", "Sum of squares", ENERGY.output, create_energy, streaming_energy),
        ("Mean", "Arithmetic mean", MEAN.output, create_mean, streaming_mean),
        ("RMS", "Root mean square", RMS.output, create_rms, streaming_rms),
    ];
    for (name, description, output, batch, streaming) in reductions {
        builder.register_batch(
            BatchDescriptor::new(name, batch)
                .category("statistics")
                .describe(description)
                .input("array", DataType::RealVector)
                .output(output, DataType::Real),
        )?;
        builder.register_streaming(
            StreamingDescriptor::new(name, streaming)
                .category("statistics")
                .describe(description)
                .input("array", DataType::RealVector)
                .output(output, DataType::Real)
                .inherits(name),
        )?;
    }

    builder.register_batch(
        BatchDescriptor::new("Scale", create_scale)
            .category("standard")
            .describe("Multiplies a signal by a factor, optionally clipping it")
            .parameter(ParameterSpec::real("factor").default_value(10.0))
            .parameter(ParameterSpec::boolean("clipping").default_value(true))
            .parameter(ParameterSpec::real("maxAbsValue").default_value(1.0).at_least(0.0))
            .input("signal", DataType::RealVector)
            .output("signal", DataType::RealVector),
    )?;
    builder.register_streaming(
        StreamingDescriptor::new("Scale", streaming_scale)
            .category("standard")
            .input("signal", DataType::RealVector)
            .output("signal", DataType::RealVector)
            .inherits("Scale"),
    )
}

struct Scale {
    factor: f32,
    clip_to: Option<f32>,
}

fn create_scale(params: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
    let max_abs = params.real("maxAbsValue")?;
    Ok(Box::new(Scale {
        factor: params.real("factor")?,
        clip_to: params.boolean("clipping")?.then_some(max_abs),
    }))
}

fn streaming_scale(params: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
    Ok(Box::new(BatchAdapter::new(create_scale(params)?)))
}

impl Algorithm for Scale {
    fn compute(&mut self, inputs: &Inputs<'_>, outputs: &mut Outputs<'_>) -> EngineResult<()> {
        let signal = inputs.real_vector("signal")?;
        let scaled: Vec<f32> = signal
            .iter()
            .map(|&x| {
                let y = x * self.factor;
                match self.clip_to {
                    Some(limit) => y.clamp(-limit, limit),
                    None => y,
                }
            })
            .collect();
        outputs.set("signal", scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::registry::{ParameterMap, Registry};
    use crate::streaming::{Network, VectorInput, VectorOutput};
    use crate::types::Slot;

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        register(&mut builder).unwrap();
        builder.build().unwrap()
    }

    fn reduce(registry: &Registry, name: &str, output: &str, array: Vec<f32>) -> EngineResult<f32> {
        let mut instance = registry.create(name, &ParameterMap::new())?;
        let result = Slot::of(DataType::Real);
        instance.bind_input("array", &Slot::new(array))?;
        instance.bind_output(output, &result)?;
        instance.compute()?;
        Ok(result.real().unwrap_or(f32::NAN))
    }

    #[test]
    fn test_reductions() {
        let registry = registry();
        assert_eq!(reduce(&registry, "Energy", "energy", vec![1.0, 2.0, 2.0]).unwrap(), 9.0);
        assert_eq!(reduce(&registry, "Mean", "mean", vec![1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(reduce(&registry, "RMS", "rms", vec![3.0, 3.0]).unwrap(), 3.0);
        assert!(matches!(
            reduce(&registry, "Mean", "mean", Vec::new()),
            Err(EngineError::Computation { .. })
        ));
    }

    #[test]
    fn test_scale_clips() {
        let registry = registry();
        let mut scale = registry.create("Scale", &ParameterMap::new()).unwrap();
        let signal = Slot::new(vec![0.05f32, -0.5, 0.2]);
        let result = Slot::of(DataType::RealVector);
        scale.bind_input("signal", &signal).unwrap();
        scale.bind_output("signal", &result).unwrap();
        scale.compute().unwrap();
        let out = result.real_vector().unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert_eq!(out[1], -1.0);
        assert_eq!(out[2], 1.0);

        let params = ParameterMap::new().with("factor", 2).with("clipping", false);
        let mut scale = registry.create("Scale", &params).unwrap();
        scale.bind_input("signal", &signal).unwrap();
        scale.bind_output("signal", &result).unwrap();
        scale.compute().unwrap();
        assert_eq!(result.real_vector().unwrap(), vec![0.1, -1.0, 0.4]);
    }

    #[test]
    fn test_streaming_mean_per_frame() {
        let registry = registry();
        let result = Slot::of(DataType::RealVector);
        let mut network = Network::new();
        let frames = network
            .add("frames", VectorInput::frames(vec![vec![1.0, 3.0], vec![2.0, 4.0, 6.0]]))
            .unwrap();
        let mean = network
            .add("mean", registry.create_streaming("Mean", &ParameterMap::new()).unwrap())
            .unwrap();
        let sink = network.add("sink", VectorOutput::instance(&result).unwrap()).unwrap();
        network.chain(&[frames, mean, sink]).unwrap();

        let summary = network.run().unwrap();
        assert_eq!(result.real_vector().unwrap(), vec![2.0, 4.0]);
        assert_eq!(summary.nodes[1].invocations, 2);
    }
}
