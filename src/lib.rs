// Tempoflow - Algorithm registry and dataflow engine for audio analysis
// Module declarations

pub mod algorithms;
pub mod audio;
pub mod batch;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod rhythm;
pub mod streaming;
pub mod types;

pub use batch::{Algorithm, Inputs, Instance, InstanceState, Outputs};
pub use error::{EngineError, EngineResult, Mode};
pub use registry::{
    create, create_streaming, init, registry, shutdown, BatchDescriptor, ParameterMap, ParameterSpec, Parameters,
    Registry, RegistryBuilder, StreamingDescriptor,
};
pub use streaming::{
    AccumulatorAdapter, BatchAdapter, CancelHandle, Consumption, Flow, Network, NetworkState, NodeId, RunSummary,
    SchedulerConfig, StreamContext, StreamingAlgorithm, StreamingInstance, VectorInput, VectorOutput,
};
pub use types::{DataType, Slot, Value};
