//! Process-wide cache of record descriptors.
//!
//! Each record type is described at most once. Concurrent first callers for
//! the same type block on a per-type cell and all observe the same result,
//! including a failed build.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::{DescriptorBuilder, Record, RecordDescriptor, StorageError};

type Slot = Arc<OnceLock<Result<&'static RecordDescriptor, String>>>;

static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Slot>>> = OnceLock::new();

/// Get the descriptor for `T`, building it on first use.
///
/// `T::describe` must not call `describe::<T>()` itself.
pub fn describe<T: Record>() -> Result<&'static RecordDescriptor, StorageError> {
    let slot = slot(TypeId::of::<T>());
    slot.get_or_init(build::<T>)
        .clone()
        .map_err(StorageError::Schema)
}

fn slot(id: TypeId) -> Slot {
    let registry = REGISTRY.get_or_init(Default::default);

    if let Some(slot) = registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return slot.clone();
    }

    registry
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(id)
        .or_default()
        .clone()
}

fn build<T: Record>() -> Result<&'static RecordDescriptor, String> {
    let type_name = std::any::type_name::<T>();
    let descriptor = T::describe(DescriptorBuilder::new(type_name)).build()?;

    tracing::debug!(
        record = type_name,
        table = %descriptor.table,
        columns = descriptor.columns.len(),
        relations = descriptor.relations.len(),
        "described record"
    );

    // One descriptor per type for the life of the process.
    Ok(Box::leak(Box::new(descriptor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Clone, Default)]
    struct Counted;

    impl Record for Counted {
        fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            builder.table("counted").primary_key("id").column("label")
        }

        fn get(&self, _column: &str) -> Option<Value> {
            None
        }

        fn set(&mut self, _column: &str, _value: Value) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Keyless;

    impl Record for Keyless {
        fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
            builder.table("keyless").column("label")
        }

        fn get(&self, _column: &str) -> Option<Value> {
            None
        }

        fn set(&mut self, _column: &str, _value: Value) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(describe::<Counted>))
            .collect();

        let descriptors: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
        for descriptor in &descriptors {
            assert!(std::ptr::eq(*descriptor, descriptors[0]));
        }
    }

    #[test]
    fn describe_is_deterministic() {
        let first = describe::<Counted>().unwrap().column_names();
        let second = describe::<Counted>().unwrap().column_names();
        assert_eq!(first, second);
        assert_eq!(first, vec!["id", "label"]);
    }

    #[test]
    fn missing_primary_key_is_a_schema_error() {
        for _ in 0..2 {
            match describe::<Keyless>() {
                Err(StorageError::Schema(msg)) => assert!(msg.contains("no primary key declared")),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}
