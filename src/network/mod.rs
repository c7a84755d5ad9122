//! Websocket fan-out of signal values.
//!
//! The [`Hub`] is the [`NetworkSink`] every published signal writes to. It
//! keeps one bounded outbound queue and one subscription set per connected
//! session; the axum server in [`server`] drains those queues onto sockets.

mod protocol;
mod server;

pub use protocol::{handle_client_message, ClientMessage, ServerMessage};
pub use server::{serve, ServerError, ServerSettings};

use crate::signal::{NetworkSink, OriginId, WireMessage};
use crate::timing::LogThrottle;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub const DEFAULT_OUTBOUND_QUEUE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

struct Session {
    origin: OriginId,
    subscriptions: HashSet<String>,
    outbound: mpsc::Sender<WireMessage>,
}

/// Connected sessions and what each one listens to.
pub struct Hub {
    sessions: RwLock<HashMap<SessionId, Session>>,
    queue_capacity: usize,
    throttle: LogThrottle,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_QUEUE)
    }
}

impl Hub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            throttle: LogThrottle::default(),
        }
    }

    /// Add a session; the receiver yields everything queued for it.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<WireMessage>) {
        let id = SessionId::next();
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.write().insert(
            id,
            Session {
                origin: OriginId::next(),
                subscriptions: HashSet::new(),
                outbound,
            },
        );
        info!("Created websocket session {}", id);
        (id, rx)
    }

    pub fn remove(&self, id: SessionId) {
        if self.sessions.write().remove(&id).is_some() {
            info!("Closed websocket session {}", id);
        }
    }

    /// Origin used for values written by `id`.
    pub fn origin(&self, id: SessionId) -> Option<OriginId> {
        self.sessions.read().get(&id).map(|s| s.origin)
    }

    /// Returns false if the session was already subscribed or is gone.
    pub fn subscribe(&self, id: SessionId, signal: &str) -> bool {
        self.sessions
            .write()
            .get_mut(&id)
            .is_some_and(|s| s.subscriptions.insert(signal.to_string()))
    }

    /// Returns false if the session was not subscribed.
    pub fn unsubscribe(&self, id: SessionId, signal: &str) -> bool {
        self.sessions
            .write()
            .get_mut(&id)
            .is_some_and(|s| s.subscriptions.remove(signal))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Queue a message for one session regardless of subscriptions.
    pub fn send_to(&self, id: SessionId, message: WireMessage) {
        let sessions = self.sessions.read();
        if let Some(session) = sessions.get(&id) {
            self.enqueue(id, session, message);
        }
    }

    fn enqueue(&self, id: SessionId, session: &Session, message: WireMessage) {
        match session.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.throttle.allow(&id.to_string()) {
                    warn!(
                        "Outbound queue full for {} ({} messages), dropping",
                        id, self.queue_capacity
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {} closed before delivery", id);
            }
        }
    }
}

impl NetworkSink for Hub {
    fn publish(&self, signal: &str, message: WireMessage) {
        let sessions = self.sessions.read();
        for (id, session) in sessions.iter() {
            if session.subscriptions.contains(signal) {
                self.enqueue(*id, session, message.clone());
            }
        }
    }

    fn has_subscribers(&self, signal: &str) -> bool {
        self.sessions
            .read()
            .values()
            .any(|s| s.subscriptions.contains(signal))
    }
}
