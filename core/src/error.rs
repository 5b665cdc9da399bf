use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Location fix unavailable: {reason}")]
    LocationUnavailable { reason: String },

    #[error("Permission denied: {what}")]
    PermissionDenied { what: String },

    #[error("Tracking already active")]
    TrackingAlreadyActive,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
