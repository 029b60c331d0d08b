//! Chunked uploads: the state machine, its driver and the batch sequencer.

pub mod orchestrator;
pub mod sequencer;
pub mod source;
pub mod state;

pub use orchestrator::{CancelHandle, StateObserver, UploadOrchestrator, UploadOutcome, UploadTransport};
pub use sequencer::{upload_batch, BatchReport, CompletedUpload, FailedUpload, SkippedFile};
pub use source::{FileSource, LocalFile, MemoryFile};
pub use state::{initialize_failed, transition, Phase, UploadEvent, UploadState};
