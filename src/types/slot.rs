// Caller-owned port storage
// A Slot is the value/buffer a caller binds to a batch port

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::value::{DataType, Value};
use crate::error::{EngineError, EngineResult};

/// Shared, typed storage cell bound to instance ports.
///
/// Cloning a slot yields another handle to the same storage, which is how a
/// caller keeps access to a buffer after binding it. The type tag is fixed at
/// creation; every write is checked against it.
#[derive(Debug, Clone)]
pub struct Slot {
    data_type: DataType,
    cell: Arc<Mutex<Arc<Value>>>,
}

impl Slot {
    /// Create a slot holding `value`; the slot's type is the value's type
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        Slot {
            data_type: value.data_type(),
            cell: Arc::new(Mutex::new(Arc::new(value))),
        }
    }

    /// Create empty storage of a given type (typically for outputs)
    pub fn of(data_type: DataType) -> Self {
        Slot {
            data_type,
            cell: Arc::new(Mutex::new(Arc::new(Value::default_for(data_type)))),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Value>> {
        // A panic while holding the lock cannot leave a half-written value:
        // writes replace the whole Arc.
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored value
    pub fn set(&self, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        if value.data_type() != self.data_type {
            return Err(EngineError::TypeMismatch {
                port: "slot".to_string(),
                expected: self.data_type,
                found: value.data_type(),
            });
        }
        *self.lock() = Arc::new(value);
        Ok(())
    }

    /// Mutate the stored value in place. A closure that changes the
    /// variant is rolled back with `TypeMismatch`.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> EngineResult<R> {
        let mut guard = self.lock();
        let previous = Arc::clone(&guard);
        let result = f(Arc::make_mut(&mut guard));
        let found = guard.data_type();
        if found != self.data_type {
            *guard = previous;
            return Err(EngineError::TypeMismatch {
                port: "slot".to_string(),
                expected: self.data_type,
                found,
            });
        }
        Ok(result)
    }

    /// Copy of the current value
    pub fn get(&self) -> Value {
        (**self.lock()).clone()
    }

    /// Cheap shared view of the current value
    pub(crate) fn snapshot(&self) -> Arc<Value> {
        Arc::clone(&self.lock())
    }

    /// Store a value already checked by the executor
    pub(crate) fn store(&self, value: Arc<Value>) {
        debug_assert_eq!(value.data_type(), self.data_type);
        *self.lock() = value;
    }

    pub fn real(&self) -> Option<f32> {
        self.lock().as_real()
    }

    pub fn integer(&self) -> Option<i64> {
        self.lock().as_integer()
    }

    pub fn real_vector(&self) -> Option<Vec<f32>> {
        self.lock().as_real_vector().map(|v| v.to_vec())
    }

    /// Whether two handles refer to the same storage
    pub fn same_storage(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_shares_storage() {
        let slot = Slot::new(vec![1.0f32, 2.0]);
        let handle = slot.clone();

        handle.set(vec![3.0f32]).unwrap();
        assert_eq!(slot.real_vector(), Some(vec![3.0]));
        assert!(slot.same_storage(&handle));
    }

    #[test]
    fn test_slot_rejects_wrong_type() {
        let slot = Slot::of(DataType::RealVector);
        let result = slot.set(1.0f32);
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
        assert_eq!(slot.real_vector(), Some(vec![]));
    }

    #[test]
    fn test_update_in_place() {
        let slot = Slot::new(vec![1.0f32, 2.0, 3.0]);
        let snapshot = slot.snapshot();

        slot.update(|value| {
            if let Value::RealVector(samples) = value {
                samples.push(4.0);
            }
        })
        .unwrap();

        // Earlier snapshots are unaffected by in-place updates
        assert_eq!(snapshot.as_real_vector().unwrap().len(), 3);
        assert_eq!(slot.real_vector().unwrap().len(), 4);
    }

    #[test]
    fn test_update_cannot_change_variant() {
        let slot = Slot::new(vec![1.0f32, 2.0]);
        let result = slot.update(|value| *value = Value::Real(3.0));

        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
        assert_eq!(slot.get().data_type(), DataType::RealVector);
        assert_eq!(slot.real_vector(), Some(vec![1.0, 2.0]));
    }
}
