use thiserror::Error;

/// A payload failed structural or semantic validation. Always names the
/// offending field; never carries raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Authentication failures are security events. Variants carry no
/// secret material so they can be rendered to callers verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unknown device")]
    UnknownDevice,

    #[error("device is revoked")]
    RevokedDevice,

    #[error("invalid device proof")]
    InvalidProof,

    #[error("payload vehicle_id does not match authenticated device")]
    VehicleMismatch,
}

/// Failure of the durable-storage collaborator. Nothing partial is ever
/// committed, so the whole ingestion is safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The caller's processing deadline passed before the record could
    /// be committed. Nothing was persisted; resubmission is safe.
    #[error("processing deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
