// Algorithm registry module
// Descriptors, parameter schemas, the two-phase registry and the factory

pub mod descriptor;
pub mod factory;
pub mod parameter;
pub mod table;

pub use descriptor::{BatchDescriptor, Constructor, Descriptor, PortSpec, StreamingDescriptor};
pub use factory::{create, create_streaming};
pub use parameter::{Constraint, ParameterMap, ParameterSpec, Parameters};
pub use table::{init, registry, shutdown, Registry, RegistryBuilder};
