//! Error types for the upload client.
//!
//! - [`TransportError`] - failures of the injected upload operations
//! - [`SourceError`] - failures reading the file being uploaded
//! - [`ClientError`] - top-level errors surfaced by the CLI
//!
//! None of these escape the orchestrator: it turns every failure into an upload
//! event. They exist for the transport, the file sources and the binary.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors from an [`UploadTransport`](crate::upload::UploadTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or no response was received.
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("Server error ({status}): {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    Decode(String),

    /// The operation observed the cancellation token.
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while reading from a [`FileSource`](crate::upload::FileSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Requested range lies outside the file.
    #[error("Range {start}..{end} is outside a file of {size} bytes")]
    OutOfRange { start: u64, end: u64, size: u64 },

    #[error("Not a file: {0}")]
    NotAFile(String),
}

// =============================================================================
// Client Errors (top-level)
// =============================================================================

/// Top-level errors of the `chunkload` binary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// One or more files were rejected or failed to upload.
    #[error("{0}")]
    Failed(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type TransportResult<T> = Result<T, TransportError>;

pub type SourceResult<T> = Result<T, SourceError>;

pub type ClientResult<T> = Result<T, ClientError>;
