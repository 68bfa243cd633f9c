/// Error types for the threshold tally library
use ark_serialize::SerializationError;

#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// An argument failed validation (malformed key, duplicate sequence order, bad quorum)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current state (keys or backups missing)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A guardian, contest or selection id was expected but not present
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Sealing a key backup failed
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Canonical encoding of a group element or scalar failed
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl TallyError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        TallyError::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        TallyError::InvalidOperation(msg.into())
    }

    pub(crate) fn key_not_found(msg: impl Into<String>) -> Self {
        TallyError::KeyNotFound(msg.into())
    }
}
