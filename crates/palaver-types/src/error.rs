use thiserror::Error;

/// Protocol failure classes. The `Display` text of each variant is exactly
/// what goes into the `message` field of an error reply; transport failures
/// are io/codec errors that terminate the connection loop instead and never
/// appear here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing or invalid field: {0}")]
    Validation(String),

    #[error("keyword already taken")]
    Conflict,

    #[error("invalid credentials")]
    Unauthorized,

    #[error("not logged in")]
    Unauthenticated,

    #[error("not a member of this chat")]
    Forbidden,

    #[error("invalid members: {}", .0.join(", "))]
    InvalidMember(Vec<String>),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("malformed request: {0}")]
    MalformedFrame(String),

    /// Storage-level failure. The detail is logged server-side only; the
    /// caller sees the generic message.
    #[error("internal error")]
    Internal(String),
}
