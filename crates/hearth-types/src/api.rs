use serde::{Deserialize, Deserializer, Serialize};

use crate::DEFAULT_ROOM;
use crate::models::MessageKind;

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

fn default_author() -> String {
    "Anonymous".to_string()
}

fn default_emoji() -> String {
    "👍".to_string()
}

fn default_after() -> i64 {
    -1
}

/// Query strings arrive as text; anything that is not an integer means "everything".
fn lenient_after<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or_else(|_| default_after()))
}

// -- Queries --

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    #[serde(default = "default_room")]
    pub room: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_room")]
    pub room: String,
    /// Only messages with a greater id are returned. -1 fetches everything.
    #[serde(default = "default_after", deserialize_with = "lenient_after")]
    pub after: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default = "default_author")]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub id: u64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageIdRequest {
    pub id: u64,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    pub id: u64,
    #[serde(default = "default_emoji")]
    pub emoji: String,
}

// -- Presence --

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(default = "default_author")]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

// -- Responses --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub ip: String,
}
