// Built-in algorithms
// Batch and streaming registrations for the audio analysis set

pub mod accumulate;
pub mod frames;
pub mod loader;
pub mod rhythm;
pub mod spectral;
pub mod stats;

use crate::error::EngineResult;
use crate::registry::RegistryBuilder;

/// Register every built-in algorithm in both modes
pub fn register_all(builder: &mut RegistryBuilder) -> EngineResult<()> {
    loader::register(builder)?;
    frames::register(builder)?;
    spectral::register(builder)?;
    stats::register(builder)?;
    accumulate::register(builder)?;
    rhythm::register(builder)?;
    Ok(())
}
