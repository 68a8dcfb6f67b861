use crate::records::EmergencyStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} '{id}' already exists")]
    Conflict { entity: &'static str, id: String },
    #[error("cannot {action} an emergency request in status '{status}'")]
    InvalidTransition {
        action: &'static str,
        status: EmergencyStatus,
    },
    #[error("no operator is signed in")]
    Unauthenticated,
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("assistant error: {0}")]
    Assistant(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
