use thiserror::Error;
use timeline_tree::ParseError;

/// Errors raised while locating or reading document sources
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unsupported URL scheme {scheme} in {reference}")]
    UnsupportedScheme { scheme: String, reference: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Cannot fetch {reference}: {message}")]
    Http { reference: String, message: String },
}

impl CommonError {
    pub fn unsupported_scheme(scheme: &str, reference: &str) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.to_string(),
            reference: reference.to_string(),
        }
    }

    pub fn http(reference: &str, message: impl ToString) -> Self {
        Self::Http {
            reference: reference.to_string(),
            message: message.to_string(),
        }
    }
}
