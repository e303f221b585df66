//! Error types for SOAP transport operations.

use crate::fault::Fault;

/// Result type alias for SOAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SOAP transport error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned a structured fault.
    #[error("{0}")]
    Fault(Fault),

    /// Response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Upload endpoint rejected the file.
    #[error("Upload failed with status {0}")]
    Upload(u16),

    /// Invalid server URL.
    #[error("Invalid URL: {0}")]
    Url(String),
}

impl Error {
    /// Returns true if the failure happened below the RPC layer.
    ///
    /// Transport failures are worth retrying; faults are semantic answers
    /// from the server and will not change on retry.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_)) || matches!(self, Self::Upload(code) if *code >= 500)
    }

    /// Returns the fault if the server answered with one.
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}
