// Algorithm registry with a two-phase lifecycle
// RegistryBuilder is the write phase; Registry is read-only and shareable across threads

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{EngineError, EngineResult, Mode};

use super::descriptor::{BatchDescriptor, Descriptor, StreamingDescriptor};
use super::parameter::{ParameterMap, Parameters};

/// Write-phase registry: collects descriptors, rejects duplicates
#[derive(Default)]
pub struct RegistryBuilder {
    batch: BTreeMap<&'static str, BatchDescriptor>,
    streaming: BTreeMap<&'static str, StreamingDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_batch(&mut self, descriptor: BatchDescriptor) -> EngineResult<()> {
        insert_unique(&mut self.batch, Mode::Batch, descriptor)
    }

    pub fn register_streaming(&mut self, descriptor: StreamingDescriptor) -> EngineResult<()> {
        insert_unique(&mut self.streaming, Mode::Streaming, descriptor)
    }

    /// Finish the write phase.
    ///
    /// Resolves equivalence links (streaming defaults fall back to the linked
    /// batch schema) and checks every declared default against its own
    /// constraint, so that `create(name, {})` can only fail on the caller's
    /// input.
    pub fn build(mut self) -> EngineResult<Registry> {
        for descriptor in self.streaming.values_mut() {
            let Some(batch_name) = descriptor.equivalent else {
                continue;
            };
            let batch = self
                .batch
                .get(batch_name)
                .ok_or_else(|| EngineError::UnknownAlgorithm {
                    mode: Mode::Batch,
                    name: batch_name.to_string(),
                })?;
            link_defaults(descriptor, batch);
        }

        for descriptor in self.batch.values() {
            check_defaults(descriptor)?;
        }
        for descriptor in self.streaming.values() {
            check_defaults(descriptor)?;
        }

        let registry = Registry {
            batch: self
                .batch
                .into_iter()
                .map(|(name, d)| (name, Arc::new(d)))
                .collect(),
            streaming: self
                .streaming
                .into_iter()
                .map(|(name, d)| (name, Arc::new(d)))
                .collect(),
        };

        log::info!(
            "Registry ready: {} batch, {} streaming algorithms",
            registry.batch.len(),
            registry.streaming.len()
        );
        Ok(registry)
    }
}

fn insert_unique<A: ?Sized>(
    table: &mut BTreeMap<&'static str, Descriptor<A>>,
    mode: Mode,
    descriptor: Descriptor<A>,
) -> EngineResult<()> {
    if table.contains_key(descriptor.name) {
        return Err(EngineError::DuplicateName {
            mode,
            name: descriptor.name.to_string(),
        });
    }
    log::debug!("Registered {} algorithm {}", mode, descriptor.name);
    table.insert(descriptor.name, descriptor);
    Ok(())
}

fn link_defaults(streaming: &mut StreamingDescriptor, batch: &BatchDescriptor) {
    for spec in streaming.parameters.iter_mut() {
        if spec.default.is_some() {
            continue;
        }
        if let Some(batch_spec) = batch.parameter_spec(spec.name) {
            if batch_spec.data_type == spec.data_type {
                spec.default = batch_spec.default.clone();
            }
        }
    }

    if streaming.inherit_parameters {
        for batch_spec in &batch.parameters {
            if streaming.parameter_spec(batch_spec.name).is_none() {
                streaming.parameters.push(batch_spec.clone());
            }
        }
    }
}

fn check_defaults<A: ?Sized>(descriptor: &Descriptor<A>) -> EngineResult<()> {
    for spec in &descriptor.parameters {
        if let Some(default) = &spec.default {
            spec.accept(descriptor.name, default.clone())?;
        }
    }
    Ok(())
}

/// Read-phase registry: immutable name → descriptor tables, one per mode
#[derive(Debug)]
pub struct Registry {
    pub(crate) batch: BTreeMap<&'static str, Arc<BatchDescriptor>>,
    pub(crate) streaming: BTreeMap<&'static str, Arc<StreamingDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding every built-in algorithm
    pub fn with_builtins() -> EngineResult<Registry> {
        let mut builder = RegistryBuilder::new();
        crate::algorithms::register_all(&mut builder)?;
        builder.build()
    }

    /// Sorted algorithm names for a mode
    pub fn names(&self, mode: Mode) -> Vec<&'static str> {
        match mode {
            Mode::Batch => self.batch.keys().copied().collect(),
            Mode::Streaming => self.streaming.keys().copied().collect(),
        }
    }

    pub fn contains(&self, mode: Mode, name: &str) -> bool {
        match mode {
            Mode::Batch => self.batch.contains_key(name),
            Mode::Streaming => self.streaming.contains_key(name),
        }
    }

    pub fn batch_descriptor(&self, name: &str) -> EngineResult<&Arc<BatchDescriptor>> {
        self.batch.get(name).ok_or_else(|| EngineError::UnknownAlgorithm {
            mode: Mode::Batch,
            name: name.to_string(),
        })
    }

    pub fn streaming_descriptor(&self, name: &str) -> EngineResult<&Arc<StreamingDescriptor>> {
        self.streaming
            .get(name)
            .ok_or_else(|| EngineError::UnknownAlgorithm {
                mode: Mode::Streaming,
                name: name.to_string(),
            })
    }

    /// Resolved default parameters for an algorithm
    pub fn default_parameters(&self, mode: Mode, name: &str) -> EngineResult<Parameters> {
        match mode {
            Mode::Batch => {
                let d = self.batch_descriptor(name)?;
                Parameters::resolve(d.name, &d.parameters, &ParameterMap::new())
            }
            Mode::Streaming => {
                let d = self.streaming_descriptor(name)?;
                Parameters::resolve(d.name, &d.parameters, &ParameterMap::new())
            }
        }
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());
static SHUT_DOWN: AtomicBool = AtomicBool::new(false);

/// Process-wide initialization: registers every built-in algorithm in both
/// modes. Registration runs once; later calls return the same registry.
pub fn init() -> EngineResult<&'static Registry> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if SHUT_DOWN.load(Ordering::Acquire) {
        return Err(EngineError::NotInitialized);
    }
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }

    let registry = Registry::with_builtins()?;
    Ok(GLOBAL.get_or_init(|| registry))
}

/// The process-wide registry, once `init` has run
pub fn registry() -> EngineResult<&'static Registry> {
    if SHUT_DOWN.load(Ordering::Acquire) {
        return Err(EngineError::NotInitialized);
    }
    GLOBAL.get().ok_or(EngineError::NotInitialized)
}

/// Close the process-wide factory surface. Instances already created stay
/// valid; new global lookups fail with `NotInitialized`.
pub fn shutdown() {
    if !SHUT_DOWN.swap(true, Ordering::AcqRel) {
        log::info!("Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Algorithm, Inputs, Outputs};
    use crate::registry::ParameterSpec;
    use crate::streaming::{Flow, StreamContext, StreamingAlgorithm};

    struct Idle;

    impl Algorithm for Idle {
        fn compute(&mut self, _: &Inputs<'_>, _: &mut Outputs<'_>) -> EngineResult<()> {
            Ok(())
        }
    }

    impl StreamingAlgorithm for Idle {
        fn process(&mut self, _: &mut StreamContext<'_>) -> EngineResult<Flow> {
            Ok(Flow::Exhausted)
        }
    }

    fn batch_idle(_: &Parameters) -> EngineResult<Box<dyn Algorithm>> {
        Ok(Box::new(Idle))
    }

    fn streaming_idle(_: &Parameters) -> EngineResult<Box<dyn StreamingAlgorithm>> {
        Ok(Box::new(Idle))
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = Registry::builder();
        builder
            .register_batch(BatchDescriptor::new("Idle", batch_idle))
            .unwrap();
        let err = builder
            .register_batch(BatchDescriptor::new("Idle", batch_idle))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName { mode: Mode::Batch, .. }));

        // Same name in the other mode is fine
        builder
            .register_streaming(StreamingDescriptor::new("Idle", streaming_idle))
            .unwrap();
    }

    #[test]
    fn test_equivalence_link_fills_defaults() {
        let mut builder = Registry::builder();
        builder
            .register_batch(
                BatchDescriptor::new("Idle", batch_idle)
                    .parameter(ParameterSpec::integer("frameSize").default_value(2048))
                    .parameter(ParameterSpec::real("gain").default_value(0.5)),
            )
            .unwrap();
        builder
            .register_streaming(
                StreamingDescriptor::new("Idle", streaming_idle)
                    .parameter(ParameterSpec::integer("frameSize"))
                    .equivalent_to("Idle"),
            )
            .unwrap();
        let registry = builder.build().unwrap();

        let params = registry.default_parameters(Mode::Streaming, "Idle").unwrap();
        assert_eq!(params.size("frameSize").unwrap(), 2048);
        // Not declared and not inherited
        assert!(params.get("gain").is_none());
    }

    #[test]
    fn test_inherited_schema() {
        let mut builder = Registry::builder();
        builder
            .register_batch(
                BatchDescriptor::new("Idle", batch_idle)
                    .parameter(ParameterSpec::real("gain").default_value(0.5)),
            )
            .unwrap();
        builder
            .register_streaming(StreamingDescriptor::new("Idle", streaming_idle).inherits("Idle"))
            .unwrap();
        let registry = builder.build().unwrap();

        let params = registry.default_parameters(Mode::Streaming, "Idle").unwrap();
        assert_eq!(params.real("gain").unwrap(), 0.5);
    }

    #[test]
    fn test_dangling_equivalence_fails_build() {
        let mut builder = Registry::builder();
        builder
            .register_streaming(StreamingDescriptor::new("Orphan", streaming_idle).equivalent_to("Missing"))
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(EngineError::UnknownAlgorithm { mode: Mode::Batch, .. })
        ));
    }

    #[test]
    fn test_invalid_default_fails_build() {
        let mut builder = Registry::builder();
        builder
            .register_batch(
                BatchDescriptor::new("Idle", batch_idle)
                    .parameter(ParameterSpec::integer("size").default_value(0).at_least(1.0)),
            )
            .unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_names_sorted_per_mode() {
        let mut builder = Registry::builder();
        builder.register_batch(BatchDescriptor::new("Zeta", batch_idle)).unwrap();
        builder.register_batch(BatchDescriptor::new("Alpha", batch_idle)).unwrap();
        let registry = builder.build().unwrap();

        assert_eq!(registry.names(Mode::Batch), vec!["Alpha", "Zeta"]);
        assert!(registry.names(Mode::Streaming).is_empty());
        assert!(registry.contains(Mode::Batch, "Zeta"));
        assert!(!registry.contains(Mode::Streaming, "Zeta"));
    }

    #[test]
    fn test_global_init_is_idempotent() {
        let first = init().unwrap();
        let second = init().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(registry().unwrap(), first));
    }
}
