use serde::{Deserialize, Serialize};

// -- Requests --
//
// Every request is one JSON object per line carrying an `action` tag plus
// the fields below. The dispatcher matches the tag first, then deserializes
// the rest of the object into the matching payload struct, so an unknown
// action is reported as such rather than as a field error.

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub keyword: String,
    pub nickname: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub keyword: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddUsersRequest {
    pub chat_id: String,
    pub users: Vec<String>,
}

/// Shared payload for `leave_chat`, `delete_chat` and `get_chat_messages`.
#[derive(Debug, Deserialize)]
pub struct ChatIdRequest {
    pub chat_id: String,
}

// -- Replies --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Bare success reply for actions with no payload.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: Status,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: Status::Ok }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub status: Status,
    pub message: String,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginReply {
    pub status: Status,
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct CreateChatReply {
    pub status: Status,
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatListReply {
    pub status: Status,
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesReply {
    pub status: Status,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub from: String,
    pub message: String,
}
