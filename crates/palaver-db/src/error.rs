use thiserror::Error;

/// Failures a store operation can report. The first three are the
/// distinguishable domain errors the protocol layer turns into specific
/// error replies; the rest surface as internal errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("keyword already taken")]
    Conflict,

    #[error("invalid credentials")]
    Unauthorized,

    #[error("invalid members: {}", .0.join(", "))]
    InvalidMember(Vec<String>),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl From<StoreError> for palaver_types::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => palaver_types::Error::Conflict,
            StoreError::Unauthorized => palaver_types::Error::Unauthorized,
            StoreError::InvalidMember(keywords) => palaver_types::Error::InvalidMember(keywords),
            StoreError::LockPoisoned => {
                palaver_types::Error::Internal("store lock poisoned".into())
            }
            StoreError::Sqlite(e) => palaver_types::Error::Internal(e.to_string()),
        }
    }
}
