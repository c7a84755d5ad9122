//! Typed publish/subscribe signals.
//!
//! A [`Signal`] is a named value cell shared between producers (audio capture,
//! spectrum analysis, system monitoring) and consumers (animations, the LED
//! renderer, the network layer). Setting a value runs every subscribed
//! callback synchronously on the caller's thread, then hands an encoded copy
//! to the network sink if one was configured at registration.

mod codec;
mod names;
mod registry;

pub use codec::{
    decode_binary_header, int_vector_encoder, json_encoder, labeled_json_encoder,
    signal_value_json, write_binary_header, BinaryMessageType, Encoder, WireMessage,
    SIGNAL_VALUE_TYPE,
};
pub use names::*;
pub use registry::{ErasedSignal, SignalRegistry};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::warn;

/// Errors raised when resolving or writing signals.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal not found: {0}")]
    NotFound(String),

    #[error("signal '{name}' holds {found}, requested as {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("could not decode value for signal '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Bound shared by every value a signal can carry.
pub trait SignalValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> SignalValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Outbound fan-out for encoded signal values (the websocket hub in production).
pub trait NetworkSink: Send + Sync {
    fn publish(&self, signal: &str, message: WireMessage);

    /// Lets a signal skip encoding when no client is listening.
    fn has_subscribers(&self, _signal: &str) -> bool {
        true
    }
}

/// Identity of whoever wrote a value, so subscribers can ignore their own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginId(u64);

impl OriginId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback<T> = Arc<dyn Fn(&T, Option<OriginId>) + Send + Sync>;

/// Network publishing settings chosen when a signal is registered.
pub struct SignalOptions<T> {
    sink: Option<Arc<dyn NetworkSink>>,
    encoder: Option<Encoder<T>>,
}

impl<T> SignalOptions<T> {
    /// In-process only: no network publishing.
    pub fn local() -> Self {
        Self {
            sink: None,
            encoder: None,
        }
    }

    pub fn published(sink: Arc<dyn NetworkSink>, encoder: Encoder<T>) -> Self {
        Self {
            sink: Some(sink),
            encoder: Some(encoder),
        }
    }

    /// Publish through `sink` when present, otherwise stay local.
    pub fn maybe_published(sink: Option<&Arc<dyn NetworkSink>>, encoder: Encoder<T>) -> Self {
        match sink {
            Some(sink) => Self::published(sink.clone(), encoder),
            None => Self::local(),
        }
    }
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::local()
    }
}

struct Publisher<T> {
    sink: Arc<dyn NetworkSink>,
    encoder: Encoder<T>,
}

struct SignalInner<T> {
    name: String,
    value: RwLock<T>,
    callbacks: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
    publisher: Option<Publisher<T>>,
}

/// Handle to a named, typed value cell. Cloning shares the same cell.
pub struct Signal<T: SignalValue> {
    inner: Arc<SignalInner<T>>,
}

impl<T: SignalValue> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SignalValue> Signal<T> {
    pub(crate) fn new(name: &str, initial: T, options: SignalOptions<T>) -> Self {
        let publisher = match (options.sink, options.encoder) {
            (Some(sink), Some(encoder)) => Some(Publisher { sink, encoder }),
            _ => None,
        };
        Self {
            inner: Arc::new(SignalInner {
                name: name.to_string(),
                value: RwLock::new(initial),
                callbacks: Mutex::new(Vec::new()),
                publisher,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    pub fn set(&self, value: T) {
        self.set_from(value, None);
    }

    /// Replace the value, notify subscribers in registration order, then publish.
    ///
    /// Callbacks run on the calling thread with the callback list unlocked, so a
    /// callback may subscribe or unsubscribe without deadlocking.
    pub fn set_from(&self, value: T, origin: Option<OriginId>) {
        *self.inner.value.write() = value.clone();

        let callbacks: Vec<Callback<T>> = self
            .inner
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&value, origin);
        }

        self.publish(&value);
    }

    fn publish(&self, value: &T) {
        let Some(publisher) = &self.inner.publisher else {
            return;
        };
        if !publisher.sink.has_subscribers(&self.inner.name) {
            return;
        }
        match (publisher.encoder)(&self.inner.name, value) {
            Ok(message) => publisher.sink.publish(&self.inner.name, message),
            Err(e) => warn!("Failed to encode signal '{}': {}", self.inner.name, e),
        }
    }

    /// Register a callback; it stays registered until the returned handle drops.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, Option<OriginId>) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.inner.callbacks.lock().push((id, Arc::new(callback)));
        let target: Arc<dyn Unregister> = self.inner.clone();
        Subscription {
            id,
            target: Arc::downgrade(&target),
        }
    }

    /// Remove a callback by id. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    /// Whether two handles refer to the same underlying cell.
    pub fn same_as(&self, other: &Signal<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: SignalValue> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: SubscriptionId) -> bool;
}

impl<T: SignalValue> Unregister for SignalInner<T> {
    fn unregister(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }
}

/// Keeps a callback registered; dropping it unregisters the callback.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    id: SubscriptionId,
    target: Weak<dyn Unregister>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(target) = self.target.upgrade() {
            target.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
