// Batch execution module
// Single-shot compute over caller-owned port storage

pub mod algorithm;
pub mod instance;

pub use algorithm::{Algorithm, Inputs, Outputs};
pub use instance::{Instance, InstanceState};
