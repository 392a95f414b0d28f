//! Error types for the editor

use thiserror::Error;
use timeline_common::CommonError;
use timeline_tree::{ParseError, PathError, StoreError};

pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("XML parse error in document: {0}")]
    Format(#[from] ParseError),

    #[error(transparent)]
    Addressing(#[from] PathError),

    #[error("No such xml:id: {0}")]
    NotFound(String),

    #[error("Another editing operation is still in progress ({active})")]
    ConcurrentEdit { active: String },

    #[error("Delivery to {target} failed: {message}")]
    Delivery { target: String, message: String },

    #[error("Tree error: {0}")]
    Store(StoreError),

    #[error("Cannot read document source: {0}")]
    Source(#[from] CommonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error in document: {0}")]
    Document(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("No document loaded")]
    NoDocument,
}

impl DocumentError {
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn delivery(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for DocumentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Path(e) => DocumentError::Addressing(e),
            StoreError::Parse(e) => DocumentError::Format(e),
            other => DocumentError::Store(other),
        }
    }
}
