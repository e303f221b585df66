//! Error types for the core library.

use thiserror::Error;

use crate::api::ApiError;
use crate::editor::{ComposeError, EditorId, UploadId};

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No editor is registered under this id.
    #[error("Editor not found: {0}")]
    EditorNotFound(EditorId),

    /// An editor with this id already exists.
    #[error("Editor already exists: {0}")]
    EditorExists(EditorId),

    /// No upload is tracked under this id.
    #[error("Upload not found: {0}")]
    UploadNotFound(UploadId),

    /// The message is already being handed to the server.
    #[error("Send already in progress for editor {0}")]
    SendInProgress(EditorId),

    /// Mail server call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Message is not ready to be sent.
    #[error("Cannot send: {0}")]
    Validation(#[from] ComposeError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
