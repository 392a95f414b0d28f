use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;
pub type PathResult<T> = Result<T, PathError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Malformed serialized tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("XML syntax error at {pos}: {message}")]
    Syntax { pos: u64, message: String },

    #[error("Unexpected end of document at {pos}")]
    UnexpectedEof { pos: u64 },

    #[error("Document has no root element")]
    Empty,

    #[error("Second root element at {pos}")]
    MultipleRoots { pos: u64 },

    #[error("Undeclared namespace prefix: {prefix}")]
    UnboundPrefix { prefix: String },
}

impl ParseError {
    pub fn syntax(pos: u64, message: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            message: message.into(),
        }
    }

    pub fn unbound_prefix(prefix: &[u8]) -> Self {
        Self::UnboundPrefix {
            prefix: String::from_utf8_lossy(prefix).into_owned(),
        }
    }
}

/// Path expression could not be parsed, or did not address exactly one node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Invalid path expression {path}: {message}")]
    Syntax { path: String, message: String },

    #[error("Unknown namespace prefix {prefix} in {path}")]
    UnknownPrefix { path: String, prefix: String },

    #[error("No tree element matches path {path}")]
    NoMatch { path: String },

    #[error("Multiple tree elements ({count}) match path {path}")]
    Ambiguous { path: String, count: usize },

    #[error("Path {path} addresses the document itself, not an element")]
    DocumentPath { path: String },
}

impl PathError {
    pub fn syntax(path: &str, message: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Syntax { path, .. }
            | Self::UnknownPrefix { path, .. }
            | Self::NoMatch { path }
            | Self::Ambiguous { path, .. }
            | Self::DocumentPath { path } => path,
        }
    }
}

/// Structural edit rejected by the store. Raised before any index is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Duplicate xml:id: {0}")]
    DuplicateId(String),

    #[error("The root element cannot be {0}")]
    RootElement(&'static str),

    #[error("Node is no longer part of the tree")]
    StaleNode,

    #[error("Cannot place a node inside its own subtree")]
    Cycle,
}
