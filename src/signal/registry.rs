use super::{OriginId, Signal, SignalError, SignalOptions, SignalValue};
use parking_lot::RwLock;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name-keyed access to a signal without knowing its value type.
pub trait ErasedSignal: Send + Sync {
    fn name(&self) -> &str;
    fn type_name(&self) -> &'static str;
    fn to_json(&self) -> Value;
    fn set_from_json(&self, value: Value, origin: Option<OriginId>) -> Result<(), SignalError>;
}

impl<T: SignalValue> ErasedSignal for Signal<T> {
    fn name(&self) -> &str {
        Signal::name(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self.get()).unwrap_or(Value::Null)
    }

    fn set_from_json(&self, value: Value, origin: Option<OriginId>) -> Result<(), SignalError> {
        let value: T = serde_json::from_value(value).map_err(|source| SignalError::Decode {
            name: Signal::name(self).to_string(),
            source,
        })?;
        self.set_from(value, origin);
        Ok(())
    }
}

struct Entry {
    type_id: TypeId,
    type_name: &'static str,
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedSignal>,
}

/// Process-wide table of signals, resolved by name and checked by type.
///
/// One instance is built at startup and handed to every component that
/// produces or consumes signals.
#[derive(Default)]
pub struct SignalRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal starting at `T::default()`, or return the existing one.
    pub fn create<T: SignalValue + Default>(
        &self,
        name: &str,
        options: SignalOptions<T>,
    ) -> Result<Signal<T>, SignalError> {
        self.create_with(name, T::default(), options)
    }

    /// Create a signal with an explicit initial value.
    ///
    /// The first registration of a name wins: later calls return the existing
    /// handle and ignore `initial` and `options`. A later call with a different
    /// value type fails with [`SignalError::TypeMismatch`].
    pub fn create_with<T: SignalValue>(
        &self,
        name: &str,
        initial: T,
        options: SignalOptions<T>,
    ) -> Result<Signal<T>, SignalError> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(name) {
            return Self::downcast(name, entry);
        }

        let signal = Signal::new(name, initial, options);
        entries.insert(
            name.to_string(),
            Entry {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                typed: Arc::new(signal.clone()),
                erased: Arc::new(signal.clone()),
            },
        );
        debug!("Registered signal '{}' ({})", name, std::any::type_name::<T>());
        Ok(signal)
    }

    /// Resolve an existing signal by name and type.
    pub fn get<T: SignalValue>(&self, name: &str) -> Result<Signal<T>, SignalError> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| SignalError::NotFound(name.to_string()))?;
        Self::downcast(name, entry)
    }

    /// Resolve a signal by name without knowing its type.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ErasedSignal>> {
        self.entries.read().get(name).map(|entry| entry.erased.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn downcast<T: SignalValue>(name: &str, entry: &Entry) -> Result<Signal<T>, SignalError> {
        let mismatch = || SignalError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
            found: entry.type_name,
        };
        if entry.type_id != TypeId::of::<T>() {
            return Err(mismatch());
        }
        entry
            .typed
            .downcast_ref::<Signal<T>>()
            .cloned()
            .ok_or_else(mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_is_idempotent_and_shares_value() {
        let registry = SignalRegistry::new();
        let first = registry.create::<i32>("X", SignalOptions::local()).unwrap();
        let second = registry.create::<i32>("X", SignalOptions::local()).unwrap();
        assert!(first.same_as(&second));

        first.set(42);
        assert_eq!(second.get(), 42);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_registration_keeps_its_initial_value() {
        let registry = SignalRegistry::new();
        registry
            .create_with("Max db", 90.0f32, SignalOptions::local())
            .unwrap();
        let again = registry
            .create_with("Max db", 10.0f32, SignalOptions::local())
            .unwrap();
        assert_eq!(again.get(), 90.0);
    }

    #[test]
    fn test_create_with_other_type_is_mismatch() {
        let registry = SignalRegistry::new();
        registry.create::<i32>("X", SignalOptions::local()).unwrap();
        let err = registry
            .create::<String>("X", SignalOptions::local())
            .err()
            .expect("type mismatch");
        match err {
            SignalError::TypeMismatch { name, .. } => assert_eq!(name, "X"),
            other => panic!("expected TypeMismatch, got {other}"),
        }
    }

    #[test]
    fn test_get_reports_missing_and_mismatched() {
        let registry = SignalRegistry::new();
        assert!(matches!(
            registry.get::<f32>("Missing"),
            Err(SignalError::NotFound(_))
        ));

        registry.create::<f32>("Level", SignalOptions::local()).unwrap();
        assert!(registry.get::<f32>("Level").is_ok());
        assert!(matches!(
            registry.get::<u8>("Level"),
            Err(SignalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_erased_lookup_reads_and_writes_json() {
        let registry = SignalRegistry::new();
        let typed = registry
            .create_with("LED User Brightness", 1.0f32, SignalOptions::local())
            .unwrap();

        let erased = registry.lookup("LED User Brightness").unwrap();
        assert_eq!(erased.to_json(), json!(1.0));
        erased.set_from_json(json!(0.25), None).unwrap();
        assert_eq!(typed.get(), 0.25);

        let err = erased.set_from_json(json!("bright"), None).unwrap_err();
        assert!(matches!(err, SignalError::Decode { .. }));
        assert_eq!(typed.get(), 0.25, "failed decode leaves value untouched");
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = SignalRegistry::new();
        registry.create::<i32>("b", SignalOptions::local()).unwrap();
        registry.create::<i32>("a", SignalOptions::local()).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.lookup("c").is_none());
    }
}
