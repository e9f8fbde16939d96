//! Reconnecting WebSocket transport for live chat events.
//!
//! [`EventSocket`] owns the connection task: it connects, decodes pushed
//! JSON frames into [`LiveEvent`]s, fans them out over a broadcast channel,
//! and reconnects with exponential backoff capped at
//! [`WS_MAX_BACKOFF_SECS`](crate::config::WS_MAX_BACKOFF_SECS).  After
//! [`WS_MAX_CONNECT_ATTEMPTS`](crate::config::WS_MAX_CONNECT_ATTEMPTS)
//! consecutive failed connection attempts the socket gives up.  All
//! reconnection policy lives here — the sync components only ever see a
//! subscription.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt as _;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::config::{
    EVENT_CHANNEL_CAPACITY, WS_INITIAL_BACKOFF_SECS, WS_MAX_BACKOFF_SECS,
    WS_MAX_CONNECT_ATTEMPTS,
};
use crate::events::LiveEvent;
use crate::session::Session;
use crate::vlog;

pub struct EventSocket {
    events: broadcast::Sender<LiveEvent>,
    task: JoinHandle<()>,
}

impl EventSocket {
    /// Connect to the backend's WebSocket endpoint and start the receive
    /// loop.  The bearer token, when present, is passed as a query
    /// credential.
    pub fn connect(ws_url: impl Into<String>, session: Arc<Session>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_socket_loop(ws_url.into(), session, events.clone()));
        Self { events, task }
    }

    /// A fresh subscription to the event stream.  Receivers that fall
    /// behind see a `Lagged` error rather than blocking the socket.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    /// Tear the socket down explicitly.  Equivalent to dropping it.
    pub fn shutdown(self) {}
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_socket_loop(
    ws_url: String,
    session: Arc<Session>,
    events: broadcast::Sender<LiveEvent>,
) {
    let mut backoff_secs = WS_INITIAL_BACKOFF_SECS;
    let mut failed_attempts = 0u32;

    loop {
        let url = match session.token() {
            Some(token) => format!("{ws_url}?token={token}"),
            None => ws_url.clone(),
        };

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                backoff_secs = WS_INITIAL_BACKOFF_SECS;
                failed_attempts = 0;
                vlog!("transport: connected to {ws_url}");
                let _ = events.send(LiveEvent::SocketStatus { connected: true });

                let (_write, mut read) = stream.split();
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => dispatch_frame(&text, &events),
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(error) => {
                            vlog!("transport: socket error: {error}");
                            break;
                        }
                    }
                }

                let _ = events.send(LiveEvent::SocketStatus { connected: false });
                vlog!("transport: disconnected, reconnecting in {backoff_secs}s");
            }
            Err(error) => {
                failed_attempts += 1;
                if failed_attempts >= WS_MAX_CONNECT_ATTEMPTS {
                    vlog!(
                        "transport: giving up after {failed_attempts} failed connection attempts: {error}"
                    );
                    let _ = events.send(LiveEvent::SocketStatus { connected: false });
                    return;
                }
                vlog!("transport: connection failed (retry in {backoff_secs}s): {error}");
            }
        }

        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(WS_MAX_BACKOFF_SECS);
    }
}

/// Decode one pushed frame.  Only the two backend event kinds are
/// forwarded; unknown tags are logged and dropped.
fn dispatch_frame(text: &str, events: &broadcast::Sender<LiveEvent>) {
    match serde_json::from_str::<LiveEvent>(text) {
        Ok(event @ (LiveEvent::NewMessage { .. } | LiveEvent::MessagesRead { .. })) => {
            let _ = events.send(event);
        }
        Ok(_) => {} // status frames are produced locally, not by the backend
        Err(error) => {
            vlog!("transport: ignoring unrecognized frame: {error}");
        }
    }
}

/// Convert an HTTP(S) API base URL into the WS(S) URL for the `/ws`
/// endpoint.
pub fn http_to_ws_url(api_url: &str) -> String {
    let base = if api_url.starts_with("https://") {
        api_url.replacen("https://", "wss://", 1)
    } else {
        api_url.replacen("http://", "ws://", 1)
    };
    format!("{}/ws", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_derivation() {
        assert_eq!(
            http_to_ws_url("http://127.0.0.1:4000/api/"),
            "ws://127.0.0.1:4000/api/ws"
        );
        assert_eq!(
            http_to_ws_url("https://api.velvet.club"),
            "wss://api.velvet.club/ws"
        );
    }
}
