//! Multi-file uploads.
//!
//! Files are validated up front (concurrently), then uploaded strictly one after
//! another through a single orchestrator. A failed file does not stop the batch;
//! a cancelled one does.

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::orchestrator::{UploadOrchestrator, UploadOutcome, UploadTransport};
use super::source::FileSource;
use crate::types::SessionId;
use crate::validation::{is_uploadable, validate_source, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub file: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub file: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub file: String,
    pub validation: ValidationResult,
}

/// What happened to each file of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Completed uploads in upload order.
    pub completed: Vec<CompletedUpload>,
    pub failed: Vec<FailedUpload>,
    /// Files that were never started because they are not uploadable.
    pub skipped: Vec<SkippedFile>,
    /// The batch stopped early.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.completed.iter().map(|c| c.session_id.clone()).collect()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Upload every uploadable file of `files`, one at a time, in order.
///
/// `stop` ends the batch between files; cancelling the orchestrator's current
/// attempt ends it too.
pub async fn upload_batch<T, F>(
    orchestrator: &UploadOrchestrator<T>,
    files: &[F],
    stop: &CancellationToken,
) -> BatchReport
where
    T: UploadTransport,
    F: FileSource,
{
    let validations = join_all(files.iter().map(validate_source)).await;
    let mut report = BatchReport::default();

    let mut queue = Vec::new();
    for (file, validation) in files.iter().zip(validations) {
        if is_uploadable(&validation) {
            queue.push(file);
        } else {
            log::warn!("Skipping {}: not uploadable", file.info().name);
            report.skipped.push(SkippedFile {
                file: file.info().name.clone(),
                validation,
            });
        }
    }

    log::info!(
        "Uploading {} of {} file(s)",
        queue.len(),
        files.len()
    );

    for file in queue {
        if stop.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let name = file.info().name.clone();
        match orchestrator.start(file).await {
            UploadOutcome::Completed { session_id } => {
                report.completed.push(CompletedUpload { file: name, session_id });
            }
            UploadOutcome::Failed { message, retryable } => {
                log::error!("Upload of {} failed: {}", name, message);
                report.failed.push(FailedUpload {
                    file: name,
                    message,
                    retryable,
                });
            }
            UploadOutcome::Cancelled => {
                report.cancelled = true;
                break;
            }
        }
    }

    report
}
