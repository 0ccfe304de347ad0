//! Error types and handling for element tree operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kelp operations
#[derive(Debug, Error)]
pub enum KelpError {
    /// A required member is absent from a definition being loaded
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// An element entry could not be read into an ElementDefinition
    #[error("Invalid element '{id}': {source}")]
    InvalidElement {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The definition as a whole is malformed (wrong resourceType, broken ordering, ...)
    #[error("Invalid definition: {message}")]
    InvalidDefinition { message: String },

    /// Insertion of an element whose parent is not in the tree
    #[error("Cannot add element '{id}': parent '{parent}' does not exist")]
    MissingParent { id: String, parent: String },

    /// Insertion of an element whose id is already taken
    #[error("Element '{id}' already exists")]
    DuplicateElement { id: String },

    /// A segment name that cannot become a single path segment
    #[error("Invalid path segment: '{segment}'")]
    InvalidSegment { segment: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Definition,
    Mutation,
    Config,
    Io,
    Json,
}

impl KelpError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KelpError::MissingField { .. }
            | KelpError::InvalidElement { .. }
            | KelpError::InvalidDefinition { .. } => ErrorKind::Definition,
            KelpError::MissingParent { .. }
            | KelpError::DuplicateElement { .. }
            | KelpError::InvalidSegment { .. } => ErrorKind::Mutation,
            KelpError::ConfigError { .. } => ErrorKind::Config,
            KelpError::IoError { .. } => ErrorKind::Io,
            KelpError::JsonError(_) => ErrorKind::Json,
        }
    }

    /// Check if this error is recoverable (processing of other definitions can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Definition | ErrorKind::Mutation | ErrorKind::Json
        )
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid definition error
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for KelpError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}
