//! Error types for the chunkload server.
//!
//! - [`CsvError`] - decoding and parsing of assembled files
//! - [`SessionError`] - upload session lifecycle errors
//! - [`ServerError`] - top-level server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while turning an assembled file into rows.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid CSV format.
    #[error("Invalid CSV format: {0}")]
    ParseError(#[from] csv::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Rejected by the structural validator.
    #[error("Not usable as CSV: {0}")]
    Rejected(String),
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors of the upload session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Upload session not found: {0}")]
    NotFound(String),

    /// The declared file has no bytes.
    #[error("Cannot upload an empty file")]
    EmptyFile,

    #[error("File of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Chunk of {size} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { size: u64, max: u64 },

    /// A chunk arrived before the previous ones.
    #[error("Chunk {got} is out of order, expected chunk {expected}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("Chunk {index} is outside a session of {total} chunks")]
    InvalidIndex { index: u64, total: u64 },

    #[error("Session declared {expected} chunks, request says {got}")]
    TotalMismatch { expected: u64, got: u64 },

    /// More bytes than the declared file size.
    #[error("Received {received} bytes for a file of {size} bytes")]
    Overflow { received: u64, size: u64 },

    #[error("Upload incomplete: {received} of {size} bytes received")]
    Incomplete { received: u64, size: u64 },

    #[error("Upload session {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("Upload session {0} is not finalized yet")]
    NotFinalized(String),

    /// Another request is assembling the file.
    #[error("Upload session {0} is being finalized")]
    Finalizing(String),

    /// The session failed earlier and accepts nothing more.
    #[error("Upload session {id} failed: {message}")]
    Failed { id: String, message: String },

    #[error("Invalid file content: {0}")]
    Content(#[from] CsvError),

    #[error("Spool IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // io::Error -> CsvError -> SessionError
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "spool missing");
        let csv_err: CsvError = io_err.into();
        let session_err: SessionError = csv_err.into();
        assert!(matches!(session_err, SessionError::Content(CsvError::IoError(_))));
        assert!(session_err.to_string().contains("spool missing"));

        let server_err: ServerError = std::io::Error::other("address in use").into();
        assert!(server_err.to_string().contains("address in use"));
    }

    #[test]
    fn test_out_of_order_format() {
        let err = SessionError::OutOfOrder { expected: 2, got: 5 };
        let msg = err.to_string();
        assert!(msg.contains("Chunk 5"));
        assert!(msg.contains("expected chunk 2"));
    }
}
