//! Domain model and wire envelopes for the conversation sync layer.
//!
//! Everything the backend sends is decoded into the explicit types below at
//! the API boundary.  Fields the backend may omit carry `#[serde(default)]`
//! so a sparse payload decodes to a well-defined value instead of an error.
//! All identifiers are opaque strings; all timestamps are integer
//! milliseconds since the UNIX epoch.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Role an account acts through.  Messages and follows are attributed to an
/// entity identity, not directly to the raw account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Bar,
    Dj,
    /// Role tags this client version does not know yet are carried verbatim.
    #[serde(untagged)]
    Other(String),
}

impl Default for EntityType {
    fn default() -> Self {
        EntityType::User
    }
}

/// Category of a message.  The set is extensible server-side, so unknown
/// tags round-trip through [`MessageType::Other`] rather than failing to
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    StoryReply,
    PostShare,
    #[serde(untagged)]
    Other(String),
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// A durable thread grouping participants and messages.
///
/// Server-owned: the client reads and re-fetches, never mutates locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    #[serde(default = "default_conversation_kind")]
    pub kind: String,
    /// Unique participant entity IDs; order is stable for display.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<u64>,
    /// Per-participant status tags (e.g. "active", "left").
    #[serde(default)]
    pub participant_status: HashMap<String, String>,
    #[serde(default)]
    pub unread_count: u32,
}

fn default_conversation_kind() -> String {
    "direct".to_string()
}

impl Conversation {
    /// All participants excluding exactly `account_id`, deduplicated with
    /// the original display order preserved.
    pub fn other_participants(&self, account_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.participants
            .iter()
            .filter(|p| p.as_str() != account_id)
            .filter(|p| seen.insert(p.as_str().to_string()))
            .cloned()
            .collect()
    }
}

/// Attachment carried by a message (media URL plus optional metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// A single message within one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_entity_type: EntityType,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// At most one of `shared_story_id` / `shared_post_id` is expected to be
    /// set; both are carried as-is when the backend disagrees.
    #[serde(default)]
    pub shared_story_id: Option<String>,
    #[serde(default)]
    pub shared_post_id: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Lightweight public-profile projection used for conversation display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub entity_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Pagination metadata attached to a message page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub has_more: bool,
}

/// One page of messages.  Absent pagination metadata means `has_more = false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub data: Vec<Message>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl MessagePage {
    pub fn has_more(&self) -> bool {
        self.pagination.as_ref().map(|p| p.has_more).unwrap_or(false)
    }
}

/// Profile lookup envelope: `success = false` or absent data means the
/// profile is simply not available, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Profile>,
}

/// Acknowledgement of a send.  `delivered = false` is the safe default when
/// the backend response is sparse or the request was short-circuited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendAck {
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Outgoing send payload.  The entity pairing is derived from the current
/// session, never supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub body: String,
    pub message_type: MessageType,
    pub sender_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(participants: &[&str]) -> Conversation {
        Conversation {
            conversation_id: "conv_1".to_string(),
            kind: "direct".to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            last_message_id: None,
            last_message_preview: None,
            last_message_at: None,
            participant_status: HashMap::new(),
            unread_count: 0,
        }
    }

    #[test]
    fn other_participants_excludes_exactly_self() {
        let conv = conversation(&["alice", "bob", "carol"]);
        assert_eq!(conv.other_participants("bob"), vec!["alice", "carol"]);
        // Unknown account: nothing is excluded.
        assert_eq!(
            conv.other_participants("mallory"),
            vec!["alice", "bob", "carol"]
        );
    }

    #[test]
    fn other_participants_deduplicates_preserving_order() {
        let conv = conversation(&["bob", "alice", "bob", "carol"]);
        assert_eq!(conv.other_participants("alice"), vec!["bob", "carol"]);
    }

    #[test]
    fn sparse_conversation_decodes_with_defaults() {
        let conv: Conversation =
            serde_json::from_str(r#"{"conversation_id": "c1"}"#).expect("decode");
        assert_eq!(conv.kind, "direct");
        assert!(conv.participants.is_empty());
        assert_eq!(conv.unread_count, 0);
        assert!(conv.last_message_at.is_none());
    }

    #[test]
    fn message_page_without_pagination_has_no_more() {
        let page: MessagePage = serde_json::from_str(r#"{"data": []}"#).expect("decode");
        assert!(!page.has_more());

        let page: MessagePage =
            serde_json::from_str(r#"{"data": [], "pagination": {"has_more": true}}"#)
                .expect("decode");
        assert!(page.has_more());
    }

    #[test]
    fn unknown_message_type_round_trips() {
        let ty: MessageType = serde_json::from_str(r#""voice_note""#).expect("decode");
        assert_eq!(ty, MessageType::Other("voice_note".to_string()));
        assert_eq!(
            serde_json::to_string(&ty).expect("encode"),
            r#""voice_note""#
        );

        let ty: MessageType = serde_json::from_str(r#""story_reply""#).expect("decode");
        assert_eq!(ty, MessageType::StoryReply);
    }

    #[test]
    fn sparse_message_decodes_with_defaults() {
        let msg: Message = serde_json::from_str(
            r#"{"message_id": "m1", "conversation_id": "c1", "sender_id": "alice"}"#,
        )
        .expect("decode");
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.sender_entity_type, EntityType::User);
        assert!(msg.attachments.is_empty());
        assert_eq!(msg.created_at, 0);
    }
}
