//! Conversation list loading and counterpart profile resolution.
//!
//! One [`ConversationLoader`] belongs to one conversation-list screen mount.
//! Loads replace the whole snapshot (list + profile map) on success and
//! preserve the last known-good list on failure; background failures are
//! logged, never surfaced as blocking errors.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::api::{ApiError, ChatApi};
use crate::config::RELOAD_DEBOUNCE_MS;
use crate::logging;
use crate::session::Session;
use crate::types::{Conversation, Profile};
use crate::vlog;

/// Renderable snapshot of the conversation list screen.
#[derive(Debug, Clone, Default)]
pub struct ConversationListState {
    pub conversations: Vec<Conversation>,
    /// Counterpart entity ID → display profile.  Only successful lookups
    /// get an entry; the map is replaced wholesale on every load.
    pub profiles: HashMap<String, Profile>,
    pub loading: bool,
    pub refreshing: bool,
    /// Informational only — the UI keeps rendering the last good list.
    pub last_error: Option<String>,
}

pub struct ConversationLoader {
    api: Arc<dyn ChatApi>,
    session: Arc<Session>,
    reload_debounce: Duration,
    /// Handle to ourselves for the debounce timer task; weak, so a pending
    /// timer never keeps an unmounted screen's loader alive.
    weak_self: Weak<Self>,
    /// Re-entrancy lock: rapid focus events must not stack network calls.
    in_flight: AtomicBool,
    state: Mutex<ConversationListState>,
    pending_reload: StdMutex<Option<JoinHandle<()>>>,
}

impl ConversationLoader {
    pub fn new(api: Arc<dyn ChatApi>, session: Arc<Session>) -> Arc<Self> {
        Self::with_debounce(api, session, Duration::from_millis(RELOAD_DEBOUNCE_MS))
    }

    /// As [`new`](Self::new) with an explicit debounce window (tests shorten
    /// it).
    pub fn with_debounce(
        api: Arc<dyn ChatApi>,
        session: Arc<Session>,
        reload_debounce: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            api,
            session,
            reload_debounce,
            weak_self: weak.clone(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ConversationListState::default()),
            pending_reload: StdMutex::new(None),
        })
    }

    pub async fn snapshot(&self) -> ConversationListState {
        self.state.lock().await.clone()
    }

    /// Fetch the conversation list and a profile for each distinct
    /// counterpart, replacing the current snapshot on success.
    ///
    /// While a load is in flight, further calls are dropped.  With no
    /// signed-in account the loading flags are cleared and the network is
    /// never touched.  The flags are cleared on every exit path so the UI
    /// cannot stick in a loading state.
    pub async fn load_conversations(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            vlog!("conversations: load already in flight, dropping duplicate call");
            return;
        }

        let account_id = match self.session.account_id() {
            Some(id) => id,
            None => {
                let mut state = self.state.lock().await;
                state.loading = false;
                state.refreshing = false;
                drop(state);
                self.in_flight.store(false, Ordering::SeqCst);
                return;
            }
        };

        self.state.lock().await.loading = true;

        let result = self.fetch_snapshot(&account_id).await;

        let mut state = self.state.lock().await;
        match result {
            Ok((conversations, profiles)) => {
                vlog!(
                    "conversations: loaded {} conversation(s), {} profile(s) for {}",
                    conversations.len(),
                    profiles.len(),
                    logging::entity_id(&account_id)
                );
                state.conversations = conversations;
                state.profiles = profiles;
                state.last_error = None;
            }
            Err(error) => {
                // Keep the last known-good list.
                vlog!("conversations: load failed: {error}");
                state.last_error = Some(error.to_string());
            }
        }
        state.loading = false;
        state.refreshing = false;
        drop(state);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Pull-to-refresh: identical to a load, with the refreshing indicator
    /// set for the duration and cleared unconditionally.
    pub async fn refresh(&self) {
        self.state.lock().await.refreshing = true;
        self.load_conversations().await;
        self.state.lock().await.refreshing = false;
    }

    /// Existing-or-new direct conversation with `other_entity_id`.
    ///
    /// The only local creation path; returns `None` when signed out or on
    /// failure (logged).
    pub async fn open_direct_conversation(&self, other_entity_id: &str) -> Option<Conversation> {
        let account_id = self.session.account_id()?;
        match self
            .api
            .create_or_get_conversation(&account_id, other_entity_id)
            .await
        {
            Ok(conversation) => conversation,
            Err(error) => {
                vlog!(
                    "conversations: create-or-get with {} failed: {error}",
                    logging::entity_id(other_entity_id)
                );
                None
            }
        }
    }

    /// Schedule a reload after the debounce window.  Each call resets the
    /// pending timer, so triggers within the window collapse into a single
    /// load.  The timer holds only a weak reference: a reload never fires
    /// against a loader whose screen has unmounted.
    pub fn schedule_reload(&self) {
        let weak = self.weak_self.clone();
        let delay = self.reload_debounce;
        let mut pending = self.pending_reload.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(loader) = weak.upgrade() {
                loader.load_conversations().await;
            }
        }));
    }

    /// Cancel any pending debounced reload.
    pub fn cancel_pending_reload(&self) {
        if let Some(handle) = self.pending_reload.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn fetch_snapshot(
        &self,
        account_id: &str,
    ) -> Result<(Vec<Conversation>, HashMap<String, Profile>), ApiError> {
        let conversations = self.api.conversations(account_id).await?;

        // Distinct counterparts across all conversations, in first-seen order.
        let mut seen = HashSet::new();
        let mut counterparts = Vec::new();
        for conversation in &conversations {
            for id in conversation.other_participants(account_id) {
                if seen.insert(id.clone()) {
                    counterparts.push(id);
                }
            }
        }

        // All profile lookups issued concurrently; one failing lookup only
        // omits its own entry.
        let fetches = counterparts
            .iter()
            .map(|id| self.api.profile_by_entity_id(id));
        let results = join_all(fetches).await;

        let mut profiles = HashMap::new();
        for (id, result) in counterparts.iter().zip(results) {
            match result {
                Ok(response) if response.success => {
                    if let Some(profile) = response.data {
                        profiles.insert(id.clone(), profile);
                    }
                }
                Ok(_) => {} // lookup reported no profile; leave the entry absent
                Err(error) => {
                    vlog!(
                        "conversations: profile fetch for {} failed: {error}",
                        logging::entity_id(id)
                    );
                }
            }
        }

        Ok((conversations, profiles))
    }
}

impl Drop for ConversationLoader {
    fn drop(&mut self) {
        if let Some(handle) = self.pending_reload.lock().unwrap().take() {
            handle.abort();
        }
    }
}
