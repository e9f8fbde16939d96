//! Live event types and the screen-lifetime event listener.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::conversations::ConversationLoader;
use crate::logging;
use crate::types::Message;
use crate::vlog;

/// Events pushed by the backend over the live transport, plus the locally
/// produced socket status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    NewMessage {
        conversation_id: String,
        message: Message,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
        #[serde(default)]
        last_read_message_id: Option<String>,
    },
    /// Emitted by the transport itself, never parsed off the wire.
    SocketStatus { connected: bool },
}

/// Subscribes to `new_message` and `messages_read` for the lifetime of the
/// owning screen.
///
/// Handlers log each event; with `reload_on_event` set they additionally
/// trigger the loader's debounced reload.  Dropping the listener (or calling
/// [`detach`](Self::detach)) removes both handlers at once by aborting the
/// task, so nothing leaks across screen remounts.
pub struct LiveEventListener {
    task: JoinHandle<()>,
}

impl LiveEventListener {
    /// Install the listener on an existing transport subscription.  Callers
    /// hold a constructed transport before they can subscribe, so the
    /// install-only-when-available contract holds by construction.
    pub fn attach(
        mut events: broadcast::Receiver<LiveEvent>,
        loader: Arc<ConversationLoader>,
        reload_on_event: bool,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LiveEvent::NewMessage {
                        conversation_id,
                        message,
                    }) => {
                        vlog!(
                            "events: new message in {} from {} (id={})",
                            logging::conv_id(&conversation_id),
                            logging::entity_id(&message.sender_id),
                            logging::msg_id(&message.message_id)
                        );
                        if reload_on_event {
                            loader.schedule_reload();
                        }
                    }
                    Ok(LiveEvent::MessagesRead {
                        conversation_id,
                        reader_id,
                        ..
                    }) => {
                        vlog!(
                            "events: messages read in {} by {}",
                            logging::conv_id(&conversation_id),
                            logging::entity_id(&reader_id)
                        );
                        if reload_on_event {
                            loader.schedule_reload();
                        }
                    }
                    Ok(LiveEvent::SocketStatus { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        vlog!("events: listener lagged, skipped {skipped} event(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    /// Tear the listener down explicitly.  Equivalent to dropping it.
    pub fn detach(self) {}
}

impl Drop for LiveEventListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
