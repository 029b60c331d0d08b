//! # Chunkload server - upload sessions for chunked CSV uploads
//!
//! Receives files chunk by chunk, assembles them on disk and turns them into a
//! typed preview once the client finalizes the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Chunks    │────▶│   Session   │────▶│   Parser    │────▶│   Preview   │
//! │ (in order)  │     │   (spool)   │     │  (auto-enc) │     │   (typed)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Server settings
//! - [`parser`] - CSV parsing with auto-detection
//! - [`sessions`] - Upload session store
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;

// Parsing
pub mod parser;

// Sessions
pub mod sessions;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{CsvError, CsvResult, ServerError, ServerResult, SessionError, SessionResult};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::ServerConfig;

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_auto,
    decode_content,
    detect_encoding,
    parse_bytes_auto,
    parse_csv_file_auto,
    parse_str,
    ParseResult,
};

// =============================================================================
// Re-exports - Sessions
// =============================================================================

pub use sessions::{spawn_sweeper, ChunkAck, SessionLimits, SessionStatus, SessionStore, UploadSession};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, ChunkQuery, FinalizeResponse, SessionCreated};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
