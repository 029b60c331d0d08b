//! REST API types for upload clients.

use axum::http::StatusCode;
use chunkload::{FileInfo, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CsvError, SessionError};
use crate::sessions::UploadSession;

/// Response to `POST /api/uploads`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub file: FileInfo,
    /// Largest chunk the server accepts
    pub max_chunk_size: u64,
}

impl SessionCreated {
    pub fn new(session: &UploadSession, max_chunk_size: u64) -> Self {
        Self {
            session_id: session.id.clone(),
            file: session.file.clone(),
            max_chunk_size,
        }
    }
}

/// Query of `PUT /api/uploads/{id}/chunks/{index}`
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkQuery {
    /// Number of chunks in the upload
    pub total: u64,
}

/// Response to `POST /api/uploads/{id}/finalize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub session_id: SessionId,
    /// Always "finalized"
    pub status: String,
    pub columns: Vec<String>,
    pub total_rows: usize,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

/// HTTP status for a session error
pub fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::EmptyFile | SessionError::InvalidIndex { .. } | SessionError::Overflow { .. } => {
            StatusCode::BAD_REQUEST
        }
        SessionError::FileTooLarge { .. } | SessionError::ChunkTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        SessionError::OutOfOrder { .. }
        | SessionError::TotalMismatch { .. }
        | SessionError::Incomplete { .. }
        | SessionError::AlreadyFinalized(_)
        | SessionError::NotFinalized(_)
        | SessionError::Finalizing(_)
        | SessionError::Failed { .. } => StatusCode::CONFLICT,
        SessionError::Content(CsvError::IoError(_)) | SessionError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SessionError::Content(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}
