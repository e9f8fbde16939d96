//! Per-conversation message synchronization.
//!
//! One [`MessageSync`] belongs to one chat screen mount and is bound to at
//! most one conversation for its lifetime.  The in-memory sequence is kept
//! ascending by creation timestamp after every mutating operation (initial
//! load, pagination merge, live append) rather than trusting fetch order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::api::{ChatApi, MessageQuery};
use crate::logging;
use crate::session::Session;
use crate::types::{Message, MessageType, SendMessageRequest};
use crate::vlog;

/// Renderable snapshot of one conversation's message screen.
#[derive(Debug, Clone, Default)]
pub struct MessageState {
    /// Ascending by `created_at`.
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub loading: bool,
    /// Set on fetch failure; existing messages are preserved.
    pub error: Option<String>,
}

pub struct MessageSync {
    api: Arc<dyn ChatApi>,
    session: Arc<Session>,
    conversation_id: Option<String>,
    /// Guards against a pagination call racing a refresh; overlapping loads
    /// are dropped, mirroring the conversation-list lock.
    in_flight: AtomicBool,
    state: Mutex<MessageState>,
}

impl MessageSync {
    /// `conversation_id = None` produces an unbound synchronizer on which
    /// every operation is a safe no-op (a chat screen can mount before its
    /// conversation identity is known).
    pub fn new(
        api: Arc<dyn ChatApi>,
        session: Arc<Session>,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            api,
            session,
            conversation_id,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(MessageState::default()),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub async fn snapshot(&self) -> MessageState {
        self.state.lock().await.clone()
    }

    /// Fetch one page of messages.
    ///
    /// With a `before` cursor the fetched page is merged in front of the
    /// current sequence and the whole sequence re-sorted; without one the
    /// page replaces the sequence.  `has_more` mirrors the page's pagination
    /// metadata (absent metadata means no more).  Failures set the error
    /// state and keep the existing messages.
    pub async fn load_messages(&self, query: MessageQuery) {
        let Some(conversation_id) = self.conversation_id.as_deref() else {
            return;
        };
        if self.in_flight.swap(true, Ordering::SeqCst) {
            vlog!(
                "messages: load already in flight for {}, dropping duplicate call",
                logging::conv_id(conversation_id)
            );
            return;
        }

        self.state.lock().await.loading = true;

        let result = self.api.messages(conversation_id, &query).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(page) => {
                let has_more = page.has_more();
                let mut merged = page.data;
                if query.before.is_some() {
                    // Older page prepended; the sort repairs any
                    // out-of-order arrival across page boundaries.
                    merged.extend(state.messages.drain(..));
                }
                sort_by_created_at(&mut merged);
                vlog!(
                    "messages: {} now holds {} message(s) (has_more={})",
                    logging::conv_id(conversation_id),
                    merged.len(),
                    has_more
                );
                state.messages = merged;
                state.has_more = has_more;
                state.error = None;
            }
            Err(error) => {
                vlog!(
                    "messages: load for {} failed: {error}",
                    logging::conv_id(conversation_id)
                );
                state.error = Some(error.to_string());
            }
        }
        state.loading = false;
        drop(state);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Send a message in the bound conversation.
    ///
    /// Empty or whitespace-only bodies, an unbound conversation, or a
    /// signed-out session return `false` without a network call.  There is
    /// no optimistic local append: the boolean is the whole contract and the
    /// caller re-syncs to observe the message.
    pub async fn send_message(&self, body: &str, message_type: MessageType) -> bool {
        if body.trim().is_empty() {
            return false;
        }
        let Some(conversation_id) = self.conversation_id.clone() else {
            return false;
        };
        let Some(account_id) = self.session.account_id() else {
            return false;
        };

        let request = SendMessageRequest {
            conversation_id,
            body: body.to_string(),
            message_type,
            sender_id: account_id.clone(),
            entity_type: self.session.entity_type(),
            entity_id: account_id,
            metadata: serde_json::Value::Null,
        };

        match self.api.send_message(&request).await {
            Ok(ack) => {
                vlog!(
                    "messages: sent to {} (delivered={})",
                    logging::conv_id(&request.conversation_id),
                    ack.delivered
                );
                ack.delivered
            }
            Err(error) => {
                vlog!(
                    "messages: send to {} failed: {error}",
                    logging::conv_id(&request.conversation_id)
                );
                false
            }
        }
    }

    /// Mark the conversation read up to the most recent message authored by
    /// someone else.
    ///
    /// Self-authored messages are never used as the marker (the backend
    /// rejects reading your own message); when every message is
    /// self-authored the marker is null.  Failures are logged, not surfaced.
    pub async fn mark_as_read(&self) {
        let Some(conversation_id) = self.conversation_id.as_deref() else {
            return;
        };
        let Some(account_id) = self.session.account_id() else {
            return;
        };

        let marker = {
            let state = self.state.lock().await;
            state
                .messages
                .iter()
                .rev()
                .find(|message| message.sender_id != account_id)
                .map(|message| message.message_id.clone())
        };

        if let Err(error) = self
            .api
            .mark_messages_read(conversation_id, &account_id, marker.as_deref())
            .await
        {
            vlog!(
                "messages: mark-read for {} failed: {error}",
                logging::conv_id(conversation_id)
            );
        }
    }

    /// Append a message received out-of-band (live event) and re-sort.
    /// Pure append: the sequence never shrinks and the stable sort never
    /// reorders messages that were already correctly ordered.
    pub async fn add_message(&self, message: Message) {
        let mut state = self.state.lock().await;
        state.messages.push(message);
        sort_by_created_at(&mut state.messages);
    }
}

fn sort_by_created_at(messages: &mut [Message]) {
    // Vec::sort_by_key is stable: equal timestamps keep arrival order.
    messages.sort_by_key(|message| message.created_at);
}
