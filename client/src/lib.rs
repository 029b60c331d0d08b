//! # Chunkload - resilient chunked CSV uploads
//!
//! Chunkload transfers large CSV files to a server in bounded-size chunks, tracks
//! progress through a pure state machine, retries transient failures and turns the
//! uploaded file into a typed preview.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│  Validator  │────▶│ Orchestrator │────▶│  Session    │
//! │ (head only) │     │   (gate)    │     │ (state mach.)│     │  preview    │
//! └─────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//!                                                │                    │
//!                                          UploadTransport      Column analyzer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chunkload::{HttpTransport, LocalFile, UploadConfig, UploadOrchestrator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let file = LocalFile::open("works.csv").await.unwrap();
//!     let orchestrator = UploadOrchestrator::new(
//!         HttpTransport::new("http://localhost:3000"),
//!         UploadConfig::default(),
//!     )
//!     .with_observer(|state| println!("{}", state.phase()));
//!
//!     let outcome = orchestrator.start(&file).await;
//!     println!("{:?}", outcome);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`config`] - Chunking and retry settings
//! - [`types`] - File snapshots and previews
//! - [`upload`] - State machine, orchestrator and batch sequencer
//! - [`validation`] - Structural CSV validation
//! - [`analysis`] - Column statistics
//! - [`services`] - HTTP transport

// Core modules
pub mod config;
pub mod error;
pub mod types;

// Uploads
pub mod upload;

// CSV inspection
pub mod analysis;
pub mod validation;

// Transports
pub mod services;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ClientError,
    ClientResult,
    SourceError,
    SourceResult,
    TransportError,
    TransportResult,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ClientSettings, UploadConfig};

// =============================================================================
// Re-exports - Types
// =============================================================================

pub use types::{FileInfo, Preview, Row, SessionId};

// =============================================================================
// Re-exports - Upload
// =============================================================================

pub use upload::{
    transition,
    upload_batch,
    BatchReport,
    CancelHandle,
    FileSource,
    LocalFile,
    MemoryFile,
    Phase,
    UploadEvent,
    UploadOrchestrator,
    UploadOutcome,
    UploadState,
    UploadTransport,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    filter_uploadable,
    is_uploadable,
    validate_bytes,
    validate_content,
    validate_source,
    ValidationResult,
    ValidationWarning,
};

// =============================================================================
// Re-exports - Analysis
// =============================================================================

pub use analysis::{
    analyze_column,
    analyze_columns,
    infer_type,
    parse_table,
    read_table,
    ColumnStats,
    ColumnType,
    NumericRange,
    Table,
};

// =============================================================================
// Re-exports - Services
// =============================================================================

pub use services::HttpTransport;
