// Type-erased values exchanged through ports
// Runtime type tags replace per-algorithm static types at the engine boundary

pub mod slot;
pub mod value;

pub use slot::Slot;
pub use value::{DataType, Value};
