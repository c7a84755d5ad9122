use super::{handle_client_message, Hub};
use crate::signal::{SignalRegistry, WireMessage};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind websocket server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("websocket server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub bind: SocketAddr,
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            outbound_queue: super::DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
    registry: Arc<SignalRegistry>,
}

pub fn router(hub: Arc<Hub>, registry: Arc<SignalRegistry>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(AppState { hub, registry })
}

/// Serve `/ws` on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    hub: Arc<Hub>,
    registry: Arc<SignalRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!("Websocket server listening on ws://{}/ws", addr);

    axum::serve(listener, router(hub, registry))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)?;

    info!("Websocket server stopped");
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn to_ws(message: WireMessage) -> Message {
    match message {
        WireMessage::Text(text) => Message::Text(text),
        WireMessage::Binary(bytes) => Message::Binary(bytes),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (session, mut outbound) = state.hub.register();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sender.send(to_ws(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&text, session, &state.hub, &state.registry);
                state.hub.send_to(session, reply);
            }
            Ok(Message::Binary(_)) => {
                debug!("{}: ignoring binary frame", session);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("{}: websocket error: {}", session, e);
                break;
            }
        }
    }

    state.hub.remove(session);
    writer.abort();
}
