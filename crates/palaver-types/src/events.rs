use serde::{Deserialize, Serialize};

/// Events pushed from the server to connected clients, as opposed to
/// replies to a request. Carried on the same line-framed stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was appended to a chat the recipient is a member of.
    NewMessage {
        chat_id: String,
        from: String,
        message: String,
    },

    /// The recipient's chat list changed (created, joined, left or deleted).
    /// Clients re-fetch with `get_chats`.
    ChatListUpdated,
}
