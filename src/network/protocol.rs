use super::{Hub, SessionId};
use crate::signal::{signal_value_json, SignalRegistry, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Message from a websocket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Subscribe { signal: String },
    Unsubscribe { signal: String },
    /// Write a value into a signal.
    SignalValue { signal: String, value: Value },
    /// Ask for the current value of a signal.
    ValueRequest { signal: String },
}

/// Status reply to a client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Echo { ok: bool, message: String },
}

impl ServerMessage {
    fn ok(message: impl Into<String>) -> Self {
        ServerMessage::Echo {
            ok: true,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        ServerMessage::Echo {
            ok: false,
            message: message.into(),
        }
    }

    fn into_wire(self) -> WireMessage {
        // Serializing a string-only enum cannot fail
        WireMessage::Text(serde_json::to_string(&self).unwrap_or_default())
    }
}

/// Apply one text frame from `session` and return the reply to send back.
///
/// Malformed input yields an error echo; it never ends the session.
pub fn handle_client_message(
    text: &str,
    session: SessionId,
    hub: &Hub,
    registry: &SignalRegistry,
) -> WireMessage {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("{}: unsupported message: {}", session, e);
            return ServerMessage::error(format!("Unsupported message: {}", e)).into_wire();
        }
    };
    debug!("{}: {:?}", session, message);

    match message {
        ClientMessage::Subscribe { signal } => {
            if !registry.contains(&signal) {
                return ServerMessage::error(format!("Unknown signal: {}", signal)).into_wire();
            }
            let reply = if hub.subscribe(session, &signal) {
                ServerMessage::ok(format!("Subscribed to {}", signal))
            } else {
                ServerMessage::ok(format!("Already subscribed to {}", signal))
            };
            reply.into_wire()
        }
        ClientMessage::Unsubscribe { signal } => {
            let reply = if hub.unsubscribe(session, &signal) {
                ServerMessage::ok(format!("Unsubscribed from {}", signal))
            } else {
                ServerMessage::ok(format!("Was not subscribed to {}", signal))
            };
            reply.into_wire()
        }
        ClientMessage::SignalValue { signal, value } => {
            let Some(target) = registry.lookup(&signal) else {
                return ServerMessage::error(format!("Unknown signal: {}", signal)).into_wire();
            };
            let reply = match target.set_from_json(value, hub.origin(session)) {
                Ok(()) => ServerMessage::ok(format!("Updated {}", signal)),
                Err(e) => ServerMessage::error(e.to_string()),
            };
            reply.into_wire()
        }
        ClientMessage::ValueRequest { signal } => match registry.lookup(&signal) {
            Some(target) => WireMessage::Text(signal_value_json(&signal, &target.to_json())),
            None => ServerMessage::error(format!("Unknown signal: {}", signal)).into_wire(),
        },
    }
}
