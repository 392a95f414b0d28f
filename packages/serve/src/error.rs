use thiserror::Error;
use timeline_editor::DocumentError;

pub type ServeResult<T> = Result<T, ServeError>;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Delivery to {listener} failed: {message}")]
    Delivery { listener: String, message: String },

    #[error("Push channel is full, dropped {kind}")]
    ChannelFull { kind: &'static str },

    #[error("Push pump has stopped")]
    Stopped,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ServeError {
    pub fn delivery(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            listener: listener.into(),
            message: message.into(),
        }
    }
}
