//! Conversation list loader tests: re-entrancy, signed-out short-circuits,
//! partial profile failures, and the debounced reload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use velvet_sync::api::{ApiError, ChatApi, MessageQuery};
use velvet_sync::conversations::ConversationLoader;
use velvet_sync::session::Session;
use velvet_sync::types::{
    Conversation, EntityType, MessagePage, Profile, ProfileResponse, SendAck, SendMessageRequest,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn conv(id: &str, participants: &[&str]) -> Conversation {
    Conversation {
        conversation_id: id.to_string(),
        kind: "direct".to_string(),
        participants: participants.iter().map(|p| p.to_string()).collect(),
        last_message_id: None,
        last_message_preview: None,
        last_message_at: None,
        participant_status: HashMap::new(),
        unread_count: 0,
    }
}

/// Per-counterpart profile behavior for the double below.
#[derive(Clone)]
enum ProfileOutcome {
    Found(&'static str),
    NoProfile,
    Fail,
}

/// `ChatApi` double serving a fixed directory of conversations and profile
/// outcomes, with call counters.
#[derive(Default)]
struct DirectoryApi {
    conversations: Mutex<Vec<Conversation>>,
    profiles: Mutex<HashMap<String, ProfileOutcome>>,
    fail_conversations: AtomicBool,
    conversation_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fetch_delay: Mutex<Duration>,
}

impl DirectoryApi {
    fn with_conversations(conversations: Vec<Conversation>) -> Arc<Self> {
        let api = Self::default();
        *api.conversations.lock().unwrap() = conversations;
        Arc::new(api)
    }

    fn set_profile(&self, entity_id: &str, outcome: ProfileOutcome) {
        self.profiles
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), outcome);
    }
}

#[async_trait]
impl ChatApi for DirectoryApi {
    async fn conversations(&self, _account_id: &str) -> Result<Vec<Conversation>, ApiError> {
        self.conversation_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                code: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn messages(
        &self,
        _conversation_id: &str,
        _query: &MessageQuery,
    ) -> Result<MessagePage, ApiError> {
        Ok(MessagePage::default())
    }

    async fn send_message(&self, _request: &SendMessageRequest) -> Result<SendAck, ApiError> {
        Ok(SendAck::default())
    }

    async fn mark_messages_read(
        &self,
        _conversation_id: &str,
        _reader_id: &str,
        _last_read_message_id: Option<&str>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn create_or_get_conversation(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Option<Conversation>, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(conv("conv_direct", &[participant_a, participant_b])))
    }

    async fn profile_by_entity_id(&self, entity_id: &str) -> Result<ProfileResponse, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .profiles
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or(ProfileOutcome::NoProfile);
        match outcome {
            ProfileOutcome::Found(display_name) => Ok(ProfileResponse {
                success: true,
                data: Some(Profile {
                    entity_id: entity_id.to_string(),
                    display_name: Some(display_name.to_string()),
                    avatar_url: None,
                }),
            }),
            ProfileOutcome::NoProfile => Ok(ProfileResponse {
                success: false,
                data: None,
            }),
            ProfileOutcome::Fail => Err(ApiError::Status {
                code: 500,
                message: "profile service down".to_string(),
            }),
        }
    }
}

fn signed_in_session() -> Arc<Session> {
    Arc::new(Session::signed_in("me", EntityType::User, "token"))
}

// ---------------------------------------------------------------------------
// Short-circuits and re-entrancy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signed_out_load_touches_nothing_and_clears_flags() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    let loader = ConversationLoader::new(api.clone(), Arc::new(Session::anonymous()));

    loader.load_conversations().await;

    let state = loader.snapshot().await;
    assert!(!state.loading);
    assert!(!state.refreshing);
    assert!(state.conversations.is_empty());
    assert_eq!(api.conversation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reentrant_loads_collapse_to_one_fetch() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    *api.fetch_delay.lock().unwrap() = Duration::from_millis(100);
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    tokio::join!(loader.load_conversations(), loader.load_conversations());

    assert_eq!(api.conversation_calls.load(Ordering::SeqCst), 1);
    let state = loader.snapshot().await;
    assert_eq!(state.conversations.len(), 1);
    assert!(!state.loading);
}

// ---------------------------------------------------------------------------
// Profile batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn profile_failures_are_isolated_per_identity() {
    let api = DirectoryApi::with_conversations(vec![
        conv("c1", &["me", "alice"]),
        conv("c2", &["me", "bob"]),
        conv("c3", &["me", "carol"]),
    ]);
    api.set_profile("alice", ProfileOutcome::Found("Alice"));
    api.set_profile("bob", ProfileOutcome::NoProfile);
    api.set_profile("carol", ProfileOutcome::Fail);
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    loader.load_conversations().await;

    let state = loader.snapshot().await;
    assert_eq!(state.conversations.len(), 3, "list load must not fail");
    assert_eq!(state.profiles.len(), 1, "only successful lookups get entries");
    assert_eq!(
        state.profiles.get("alice").and_then(|p| p.display_name.clone()),
        Some("Alice".to_string())
    );
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn shared_counterparts_are_fetched_once() {
    let api = DirectoryApi::with_conversations(vec![
        conv("c1", &["me", "alice"]),
        conv("c2", &["me", "alice", "bob"]),
    ]);
    api.set_profile("alice", ProfileOutcome::Found("Alice"));
    api.set_profile("bob", ProfileOutcome::Found("Bob"));
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    loader.load_conversations().await;

    assert_eq!(api.profile_calls.load(Ordering::SeqCst), 2);
    assert_eq!(loader.snapshot().await.profiles.len(), 2);
}

// ---------------------------------------------------------------------------
// Failure handling and refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_reload_keeps_last_known_good_list() {
    let api = DirectoryApi::with_conversations(vec![
        conv("c1", &["me", "alice"]),
        conv("c2", &["me", "bob"]),
    ]);
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    loader.load_conversations().await;
    assert_eq!(loader.snapshot().await.conversations.len(), 2);

    api.fail_conversations.store(true, Ordering::SeqCst);
    loader.load_conversations().await;

    let state = loader.snapshot().await;
    assert_eq!(state.conversations.len(), 2, "stale list beats no list");
    assert!(state.last_error.is_some());
    assert!(!state.loading);
    assert!(!state.refreshing);
}

#[tokio::test]
async fn refresh_clears_the_indicator_unconditionally() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    api.fail_conversations.store(true, Ordering::SeqCst);
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    loader.refresh().await;

    assert!(!loader.snapshot().await.refreshing);
}

// ---------------------------------------------------------------------------
// Debounced reload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rapid_reload_triggers_collapse_into_one_load() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    let loader =
        ConversationLoader::with_debounce(api.clone(), signed_in_session(), Duration::from_millis(50));

    loader.schedule_reload();
    tokio::time::sleep(Duration::from_millis(10)).await;
    loader.schedule_reload();
    tokio::time::sleep(Duration::from_millis(10)).await;
    loader.schedule_reload();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.conversation_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_reload_never_fires() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    let loader =
        ConversationLoader::with_debounce(api.clone(), signed_in_session(), Duration::from_millis(50));

    loader.schedule_reload();
    loader.cancel_pending_reload();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.conversation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropping_the_loader_cancels_the_pending_reload() {
    let api = DirectoryApi::with_conversations(vec![conv("c1", &["me", "alice"])]);
    let loader =
        ConversationLoader::with_debounce(api.clone(), signed_in_session(), Duration::from_millis(50));

    loader.schedule_reload();
    drop(loader);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.conversation_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Create-or-get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_direct_conversation_goes_through_create_or_get() {
    let api = DirectoryApi::with_conversations(Vec::new());
    let loader = ConversationLoader::new(api.clone(), signed_in_session());

    let conversation = loader.open_direct_conversation("bar_9").await;

    assert_eq!(
        conversation.map(|c| c.conversation_id),
        Some("conv_direct".to_string())
    );
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_direct_conversation_requires_an_account() {
    let api = DirectoryApi::with_conversations(Vec::new());
    let loader = ConversationLoader::new(api.clone(), Arc::new(Session::anonymous()));

    assert!(loader.open_direct_conversation("bar_9").await.is_none());
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
}
