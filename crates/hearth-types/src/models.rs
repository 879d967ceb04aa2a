use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// emoji -> identities that reacted with it, in the order they reacted.
pub type ReactionMap = BTreeMap<String, Vec<String>>;

/// message_id -> reactions on that message.
pub type ReactionTable = BTreeMap<u64, ReactionMap>;

/// message_id -> identities that have read it, in the order they read it.
pub type ReceiptTable = BTreeMap<u64, Vec<String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    Action,
    System,
}

/// A stored chat message.
///
/// Field names on the wire and on disk are the short ones the browser client
/// and existing `chat_messages.json` files use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub room: String,
    #[serde(rename = "user")]
    pub author_name: String,
    #[serde(rename = "avatar", default)]
    pub author_avatar: String,
    pub text: String,
    /// Local wall-clock time of posting, "HH:MM".
    #[serde(rename = "time")]
    pub created_at: String,
    /// Identity of the poster. Only this identity may edit or delete.
    #[serde(rename = "ip")]
    pub origin_identity: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(rename = "target", default)]
    pub target_identity: Option<String>,
    #[serde(default)]
    pub edited: bool,
}

/// A message joined with its current reactions and read receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub reactions: ReactionMap,
    pub read_by: Vec<String>,
}

/// What other room members see about an active identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
    pub nickname: String,
    pub avatar: String,
}
