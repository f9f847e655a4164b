use thiserror::Error;

use crate::{convert::ConvertError, runtime::RuntimeError, store::StoreError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] RuntimeError),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => CoreError::NotFound { kind, id },
            other => CoreError::Store(other),
        }
    }
}
