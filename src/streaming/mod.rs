// Streaming execution module
// Connected dataflow graphs with bounded buffers, backpressure and end-of-stream

pub mod adapter;
pub mod algorithm;
pub mod instance;
pub mod io;
pub mod network;
pub mod scheduler;

pub use adapter::{AccumulatorAdapter, BatchAdapter};
pub use algorithm::{Consumption, Flow, StreamContext, StreamingAlgorithm};
pub use instance::StreamingInstance;
pub use io::{VectorInput, VectorOutput};
pub use network::{Network, NetworkState, NodeId};
pub use scheduler::{CancelHandle, NodeReport, RunSummary, SchedulerConfig};
