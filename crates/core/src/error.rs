use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CrmError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CrmError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CrmError::Validation(msg.into())
    }
}
