//! Upload orchestrator.
//!
//! Drives one file through an attempt by calling the three operations of an
//! [`UploadTransport`] in strict sequence and feeding their outcomes into the
//! state machine:
//!
//! ```text
//! FileSelected ─▶ admission check ─▶ initialize ─▶ send_chunk × N (retried) ─▶ finalize
//! ```
//!
//! Every resulting [`UploadState`] is pushed to the observer in production order.
//! Snapshots are emitted while holding the orchestrator lock, so the observer must
//! not call back into the orchestrator.
//!
//! # Cancellation
//!
//! Each attempt owns a fresh [`CancellationToken`]. [`CancelHandle::cancel`] arms it
//! and emits `Cancel` in the same critical section. Every pending operation is raced
//! against the token, and no event is emitted once the token is armed, so a
//! cancelled attempt always ends on `Idle` even if an operation never resolves.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use super::source::FileSource;
use super::state::{initialize_failed, transition, UploadEvent, UploadState};
use crate::config::UploadConfig;
use crate::error::{TransportError, TransportResult};
use crate::types::{FileInfo, SessionId};

// =============================================================================
// Injected operations
// =============================================================================

/// The I/O boundary of an upload: one session per file.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Open a server-side session sized to `file`.
    async fn initialize(
        &self,
        file: &FileInfo,
        cancel: &CancellationToken,
    ) -> TransportResult<SessionId>;

    /// Deliver exactly one chunk.
    async fn send_chunk(
        &self,
        session_id: &str,
        chunk_index: u64,
        total_chunks: u64,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> TransportResult<()>;

    /// Signal that every chunk was delivered.
    async fn finalize(&self, session_id: &str, cancel: &CancellationToken) -> TransportResult<()>;
}

#[async_trait]
impl<T: UploadTransport + ?Sized> UploadTransport for Arc<T> {
    async fn initialize(
        &self,
        file: &FileInfo,
        cancel: &CancellationToken,
    ) -> TransportResult<SessionId> {
        (**self).initialize(file, cancel).await
    }

    async fn send_chunk(
        &self,
        session_id: &str,
        chunk_index: u64,
        total_chunks: u64,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> TransportResult<()> {
        (**self)
            .send_chunk(session_id, chunk_index, total_chunks, data, cancel)
            .await
    }

    async fn finalize(&self, session_id: &str, cancel: &CancellationToken) -> TransportResult<()> {
        (**self).finalize(session_id, cancel).await
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed { session_id: SessionId },
    Failed { message: String, retryable: bool },
    Cancelled,
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed { .. })
    }
}

/// Receives every state snapshot, in order.
pub type StateObserver = Box<dyn FnMut(&UploadState) + Send>;

// =============================================================================
// Shared state
// =============================================================================

struct Shared {
    state: UploadState,
    observer: Option<StateObserver>,
    token: CancellationToken,
}

impl Shared {
    fn apply(&mut self, event: UploadEvent) {
        let next = transition(&self.state, &event);
        log::debug!("{:?} -> {}", event, next.phase());
        self.publish(next);
    }

    fn publish(&mut self, state: UploadState) {
        self.state = state;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.state);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancels the current attempt of an orchestrator from anywhere.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Mutex<Shared>>,
}

impl CancelHandle {
    /// Arm the token and move an in-flight attempt to `Idle`.
    pub fn cancel(&self) {
        let mut shared = lock(&self.shared);
        shared.token.cancel();
        if shared.state.is_active() {
            log::info!("Upload cancelled");
            shared.apply(UploadEvent::Cancel);
        }
    }
}

/// Await `fut` unless `token` fires first. `None` means cancelled.
async fn race<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => (!token.is_cancelled()).then_some(out),
    }
}

/// Why the chunk loop stopped early.
enum ChunkError {
    Cancelled,
    Failed(String),
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives uploads through an injected [`UploadTransport`], one attempt at a time.
pub struct UploadOrchestrator<T> {
    transport: T,
    config: UploadConfig,
    shared: Arc<Mutex<Shared>>,
}

impl<T: UploadTransport> UploadOrchestrator<T> {
    pub fn new(transport: T, config: UploadConfig) -> Self {
        Self {
            transport,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: UploadState::Idle,
                observer: None,
                token: CancellationToken::new(),
            })),
        }
    }

    /// Install the state observer.
    pub fn with_observer(self, observer: impl FnMut(&UploadState) + Send + 'static) -> Self {
        self.set_observer(observer);
        self
    }

    pub fn set_observer(&self, observer: impl FnMut(&UploadState) + Send + 'static) {
        lock(&self.shared).observer = Some(Box::new(observer));
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> UploadState {
        lock(&self.shared).state.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Run one full attempt for `source`.
    ///
    /// Never fails: every error ends up in the state and in the returned outcome.
    pub async fn start<F: FileSource + ?Sized>(&self, source: &F) -> UploadOutcome {
        let token = self.begin_attempt();
        let file = source.info().clone();

        if !self.advance(&token, UploadEvent::FileSelected { file: file.clone() }) {
            return self.outcome();
        }

        if let Err(message) = check_admission(&file) {
            log::warn!("Rejected {}: {}", file.name, message);
            self.advance(&token, UploadEvent::ValidationFailed { message });
            return self.outcome();
        }

        let chunks_total = self.config.chunks_for(file.size);
        log::info!(
            "Uploading {} ({} bytes) in {} chunk(s)",
            file.name,
            file.size,
            chunks_total
        );

        let session_id = match race(&token, self.transport.initialize(&file, &token)).await {
            None => return self.outcome(),
            Some(Ok(session_id)) => session_id,
            Some(Err(err)) => {
                self.fail_initialize(&token, &err);
                return self.outcome();
            }
        };

        if !self.advance(
            &token,
            UploadEvent::ValidationPassed {
                session_id: session_id.clone(),
                chunks_total,
            },
        ) {
            return self.outcome();
        }

        match self
            .send_chunks(&token, source, &session_id, chunks_total)
            .await
        {
            Ok(()) => {}
            Err(ChunkError::Cancelled) => return self.outcome(),
            Err(ChunkError::Failed(message)) => {
                self.advance(&token, UploadEvent::ChunkFailed { message });
                return self.outcome();
            }
        }

        match race(&token, self.transport.finalize(&session_id, &token)).await {
            None => {}
            Some(Ok(())) => {
                log::info!("Upload of {} complete (session {})", file.name, session_id);
                self.advance(&token, UploadEvent::FinalizeSuccess);
            }
            Some(Err(err)) => {
                log::warn!("Finalize failed for session {}: {}", session_id, err);
                self.advance(
                    &token,
                    UploadEvent::FinalizeFailed {
                        message: format!("Server failed to finalize the upload: {}", err),
                    },
                );
            }
        }

        self.outcome()
    }

    /// Replace the token and reset to `Idle` without emitting.
    fn begin_attempt(&self) -> CancellationToken {
        let mut shared = lock(&self.shared);
        shared.token.cancel();
        shared.token = CancellationToken::new();
        shared.state = UploadState::Idle;
        shared.token.clone()
    }

    /// Apply `event` unless the attempt was cancelled. Returns whether it was applied.
    fn advance(&self, token: &CancellationToken, event: UploadEvent) -> bool {
        let mut shared = lock(&self.shared);
        if token.is_cancelled() {
            return false;
        }
        shared.apply(event);
        true
    }

    /// Initialize failures are retryable and carry no session id.
    fn fail_initialize(&self, token: &CancellationToken, err: &TransportError) {
        log::warn!("Failed to open upload session: {}", err);

        let mut shared = lock(&self.shared);
        if token.is_cancelled() {
            return;
        }
        let message = format!("Could not reach the upload server: {}", err);
        let next = initialize_failed(&shared.state, &message);
        shared.publish(next);
    }

    async fn send_chunks<F: FileSource + ?Sized>(
        &self,
        token: &CancellationToken,
        source: &F,
        session_id: &str,
        chunks_total: u64,
    ) -> Result<(), ChunkError> {
        let size = source.info().size;
        let chunk_size = self.config.chunk_size.max(1);

        for index in 0..chunks_total {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(size);

            let data = match race(token, source.read_range(start..end)).await {
                None => return Err(ChunkError::Cancelled),
                Some(Ok(data)) => data,
                Some(Err(err)) => {
                    return Err(ChunkError::Failed(format!(
                        "Failed to read chunk {} of {}: {}",
                        index + 1,
                        chunks_total,
                        err
                    )))
                }
            };

            match self
                .send_with_retry(token, session_id, index, chunks_total, &data)
                .await
            {
                None => return Err(ChunkError::Cancelled),
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    return Err(ChunkError::Failed(format!(
                        "Failed to upload chunk {} of {} after {} attempt(s): {}",
                        index + 1,
                        chunks_total,
                        self.config.max_retries.max(1),
                        err
                    )))
                }
            }

            if !self.advance(token, UploadEvent::ChunkSent { bytes_sent: end }) {
                return Err(ChunkError::Cancelled);
            }
        }

        Ok(())
    }

    /// Up to `max_retries` attempts with a fixed delay in between. `None` means cancelled.
    async fn send_with_retry(
        &self,
        token: &CancellationToken,
        session_id: &str,
        index: u64,
        chunks_total: u64,
        data: &[u8],
    ) -> Option<TransportResult<()>> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let sent = self
                .transport
                .send_chunk(session_id, index, chunks_total, data, token);

            match race(token, sent).await? {
                Ok(()) => return Some(Ok(())),
                Err(err) => {
                    log::warn!(
                        "Chunk {}/{} attempt {}/{} failed: {}",
                        index + 1,
                        chunks_total,
                        attempt,
                        attempts,
                        err
                    );
                    last_error = Some(err);

                    if attempt < attempts {
                        log::info!("Retrying in {}ms...", self.config.retry_delay_ms);
                        race(token, tokio::time::sleep(self.config.retry_delay())).await?;
                    }
                }
            }
        }

        last_error.map(Err)
    }

    fn outcome(&self) -> UploadOutcome {
        match self.state() {
            UploadState::Done { session_id } => UploadOutcome::Completed { session_id },
            UploadState::Error { message, retryable, .. } => {
                UploadOutcome::Failed { message, retryable }
            }
            _ => UploadOutcome::Cancelled,
        }
    }
}

/// Admission rules checked before any I/O.
fn check_admission(file: &FileInfo) -> Result<(), String> {
    if file.size == 0 {
        return Err("File is empty".to_string());
    }
    if !file.looks_like_csv() {
        return Err(format!("{} is not a CSV file", file.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::source::MemoryFile;
    use crate::upload::state::Phase;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    /// Transport whose behaviour is scripted per test.
    #[derive(Default)]
    struct ScriptedTransport {
        fail_init: bool,
        hang_on_init: bool,
        /// Number of upcoming `send_chunk` calls that fail.
        chunk_failures: AtomicU32,
        always_fail_chunks: bool,
        hang_on_chunk: bool,
        fail_finalize: bool,
        hang_on_finalize: bool,
        chunk_calls: AtomicU32,
        finalize_calls: AtomicU32,
        received: Mutex<Vec<(u64, u64, usize)>>,
        init_started: Notify,
        chunk_started: Notify,
        chunk_failed: Notify,
        finalize_started: Notify,
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn initialize(
            &self,
            _file: &FileInfo,
            _cancel: &CancellationToken,
        ) -> TransportResult<SessionId> {
            if self.hang_on_init {
                self.init_started.notify_one();
                std::future::pending::<()>().await;
            }
            if self.fail_init {
                return Err(TransportError::Request("connection refused".into()));
            }
            Ok("session-1".into())
        }

        async fn send_chunk(
            &self,
            _session_id: &str,
            chunk_index: u64,
            total_chunks: u64,
            data: &[u8],
            _cancel: &CancellationToken,
        ) -> TransportResult<()> {
            self.chunk_calls.fetch_add(1, Ordering::SeqCst);

            if self.hang_on_chunk {
                self.chunk_started.notify_one();
                std::future::pending::<()>().await;
            }
            if self.always_fail_chunks {
                return Err(TransportError::Request("timeout".into()));
            }
            let remaining = self.chunk_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.chunk_failures.store(remaining - 1, Ordering::SeqCst);
                self.chunk_failed.notify_one();
                return Err(TransportError::Status {
                    status: 503,
                    message: "busy".into(),
                });
            }

            self.received
                .lock()
                .unwrap()
                .push((chunk_index, total_chunks, data.len()));
            Ok(())
        }

        async fn finalize(&self, _session_id: &str, _cancel: &CancellationToken) -> TransportResult<()> {
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_on_finalize {
                self.finalize_started.notify_one();
                std::future::pending::<()>().await;
            }
            if self.fail_finalize {
                return Err(TransportError::Status {
                    status: 422,
                    message: "invalid csv".into(),
                });
            }
            Ok(())
        }
    }

    fn test_config() -> UploadConfig {
        UploadConfig::default()
            .with_chunk_size(1024)
            .with_max_retries(3)
            .with_retry_delay_ms(1)
    }

    fn csv_file(size: usize) -> MemoryFile {
        MemoryFile::new("data.csv", "text/csv", vec![b'a'; size])
    }

    type Recording = (
        UploadOrchestrator<Arc<ScriptedTransport>>,
        Arc<Mutex<Vec<UploadState>>>,
    );

    fn recording(transport: Arc<ScriptedTransport>) -> Recording {
        recording_with(transport, test_config())
    }

    fn recording_with(transport: Arc<ScriptedTransport>, config: UploadConfig) -> Recording {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let orchestrator = UploadOrchestrator::new(transport, config)
            .with_observer(move |state| sink.lock().unwrap().push(state.clone()));
        (orchestrator, states)
    }

    /// Start an upload, cancel it once `reached` resolves, and return the outcome,
    /// the final state and every emitted phase.
    async fn cancel_once<W: Future<Output = ()>>(
        transport: Arc<ScriptedTransport>,
        config: UploadConfig,
        size: usize,
        reached: W,
    ) -> (UploadOutcome, UploadState, Vec<Phase>) {
        let (orchestrator, states) = recording_with(transport, config);
        let orchestrator = Arc::new(orchestrator);
        let handle = orchestrator.cancel_handle();

        let runner = Arc::clone(&orchestrator);
        let task = tokio::spawn(async move { runner.start(&csv_file(size)).await });

        reached.await;
        handle.cancel();

        let outcome = task.await.unwrap();
        (outcome, orchestrator.state(), phases(&states))
    }

    fn phases(states: &Mutex<Vec<UploadState>>) -> Vec<Phase> {
        states.lock().unwrap().iter().map(UploadState::phase).collect()
    }

    #[tokio::test]
    async fn test_two_chunk_upload_phase_sequence() {
        let transport = Arc::new(ScriptedTransport::default());
        let (orchestrator, states) = recording(Arc::clone(&transport));

        let outcome = orchestrator.start(&csv_file(2048)).await;

        assert_eq!(
            outcome,
            UploadOutcome::Completed { session_id: "session-1".into() }
        );
        assert_eq!(
            phases(&states),
            vec![
                Phase::Validating,
                Phase::Uploading,
                Phase::Uploading,
                Phase::Finalizing,
                Phase::Done,
            ]
        );
        assert_eq!(
            *transport.received.lock().unwrap(),
            vec![(0, 2, 1024), (1, 2, 1024)]
        );
        assert_eq!(transport.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let transport = Arc::new(ScriptedTransport::default());
        let (orchestrator, states) = recording(Arc::clone(&transport));

        orchestrator.start(&csv_file(5000)).await;

        let states = states.lock().unwrap();
        let mut last = (0u64, 0u64);
        for state in states.iter() {
            if let UploadState::Uploading {
                bytes_sent,
                bytes_total,
                chunks_completed,
                chunks_total,
                ..
            } = state
            {
                assert!(*bytes_sent >= last.0 && *chunks_completed >= last.1);
                assert!(bytes_sent <= bytes_total);
                assert!(chunks_completed < chunks_total);
                assert_eq!(*bytes_total, 5000);
                last = (*bytes_sent, *chunks_completed);
            }
        }
        assert_eq!(last, (4096, 4));
        // Last chunk is 5000 - 4096 bytes.
        assert_eq!(transport.received.lock().unwrap().last(), Some(&(4, 5, 904)));
        assert_eq!(states.last().map(UploadState::phase), Some(Phase::Done));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let transport = Arc::new(ScriptedTransport {
            chunk_failures: AtomicU32::new(2),
            ..Default::default()
        });
        let (orchestrator, _states) = recording(Arc::clone(&transport));

        let outcome = orchestrator.start(&csv_file(100)).await;

        assert!(outcome.is_completed());
        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_exhausted() {
        let transport = Arc::new(ScriptedTransport {
            always_fail_chunks: true,
            ..Default::default()
        });
        let (orchestrator, states) = recording(Arc::clone(&transport));

        let outcome = orchestrator.start(&csv_file(3000)).await;

        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.finalize_calls.load(Ordering::SeqCst), 0);
        match outcome {
            UploadOutcome::Failed { message, retryable } => {
                assert!(retryable);
                assert!(message.contains("chunk 1 of 3"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        match states.lock().unwrap().last() {
            Some(UploadState::Error { session_id, file, .. }) => {
                assert_eq!(session_id.as_deref(), Some("session-1"));
                assert_eq!(file.as_ref().map(|f| f.size), Some(3000));
            }
            other => panic!("Expected Error state, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_initialize_failure_is_retryable() {
        let transport = Arc::new(ScriptedTransport {
            fail_init: true,
            ..Default::default()
        });
        let (orchestrator, states) = recording(Arc::clone(&transport));

        let outcome = orchestrator.start(&csv_file(10)).await;

        assert!(matches!(outcome, UploadOutcome::Failed { retryable: true, .. }));
        // The shim is never emitted.
        assert_eq!(phases(&states), vec![Phase::Validating, Phase::Error]);
        match states.lock().unwrap().last() {
            Some(UploadState::Error { message, session_id, .. }) => {
                assert!(message.contains("Could not reach the upload server"));
                assert_eq!(*session_id, None);
            }
            other => panic!("Expected Error state, got {:?}", other),
        }
        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finalize_failure_is_retryable() {
        let transport = Arc::new(ScriptedTransport {
            fail_finalize: true,
            ..Default::default()
        });
        let (orchestrator, states) = recording(Arc::clone(&transport));

        let outcome = orchestrator.start(&csv_file(10)).await;

        assert!(matches!(outcome, UploadOutcome::Failed { retryable: true, .. }));
        assert_eq!(
            phases(&states),
            vec![Phase::Validating, Phase::Uploading, Phase::Finalizing, Phase::Error]
        );
    }

    #[tokio::test]
    async fn test_empty_and_non_csv_files_are_rejected() {
        let transport = Arc::new(ScriptedTransport::default());
        let (orchestrator, _states) = recording(Arc::clone(&transport));

        let empty = MemoryFile::new("empty.csv", "text/csv", Vec::new());
        assert!(matches!(
            orchestrator.start(&empty).await,
            UploadOutcome::Failed { retryable: false, .. }
        ));

        let json = MemoryFile::new("data.json", "application/json", b"{}".to_vec());
        match orchestrator.start(&json).await {
            UploadOutcome::Failed { message, retryable } => {
                assert!(!retryable);
                assert!(message.contains("not a CSV"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_csv_mime_without_extension_is_accepted() {
        let transport = Arc::new(ScriptedTransport::default());
        let (orchestrator, _states) = recording(transport);

        let file = MemoryFile::new("export", "text/csv", b"a,b\n1,2\n".to_vec());
        assert!(orchestrator.start(&file).await.is_completed());
    }

    #[tokio::test]
    async fn test_cancel_while_chunk_pending() {
        let transport = Arc::new(ScriptedTransport {
            hang_on_chunk: true,
            ..Default::default()
        });
        let (orchestrator, states) = recording(Arc::clone(&transport));
        let orchestrator = Arc::new(orchestrator);
        let handle = orchestrator.cancel_handle();

        let runner = Arc::clone(&orchestrator);
        let task = tokio::spawn(async move { runner.start(&csv_file(2048)).await });

        transport.chunk_started.notified().await;
        handle.cancel();

        let outcome = task.await.unwrap();
        assert_eq!(outcome, UploadOutcome::Cancelled);
        assert_eq!(orchestrator.state(), UploadState::Idle);
        assert_eq!(
            phases(&states),
            vec![Phase::Validating, Phase::Uploading, Phase::Idle]
        );
        assert!(transport.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_initialize_pending() {
        let transport = Arc::new(ScriptedTransport {
            hang_on_init: true,
            ..Default::default()
        });

        let (outcome, state, phases) = cancel_once(
            Arc::clone(&transport),
            test_config(),
            2048,
            transport.init_started.notified(),
        )
        .await;

        assert_eq!(outcome, UploadOutcome::Cancelled);
        assert_eq!(state, UploadState::Idle);
        assert_eq!(phases, vec![Phase::Validating, Phase::Idle]);
        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_finalize_pending() {
        let transport = Arc::new(ScriptedTransport {
            hang_on_finalize: true,
            ..Default::default()
        });

        let (outcome, state, phases) = cancel_once(
            Arc::clone(&transport),
            test_config(),
            2048,
            transport.finalize_started.notified(),
        )
        .await;

        assert_eq!(outcome, UploadOutcome::Cancelled);
        assert_eq!(state, UploadState::Idle);
        assert_eq!(
            phases,
            vec![
                Phase::Validating,
                Phase::Uploading,
                Phase::Uploading,
                Phase::Finalizing,
                Phase::Idle,
            ]
        );
        assert_eq!(transport.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let transport = Arc::new(ScriptedTransport {
            chunk_failures: AtomicU32::new(1),
            ..Default::default()
        });
        let config = test_config().with_retry_delay_ms(60_000);

        let (outcome, state, phases) = cancel_once(
            Arc::clone(&transport),
            config,
            2048,
            transport.chunk_failed.notified(),
        )
        .await;

        assert_eq!(outcome, UploadOutcome::Cancelled);
        assert_eq!(state, UploadState::Idle);
        assert_eq!(phases, vec![Phase::Validating, Phase::Uploading, Phase::Idle]);
        // The second attempt never runs.
        assert_eq!(transport.chunk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.finalize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_emits_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let (orchestrator, states) = recording(transport);

        orchestrator.cancel();

        assert!(states.lock().unwrap().is_empty());
        assert_eq!(orchestrator.state(), UploadState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_failure_uses_fresh_token() {
        let transport = Arc::new(ScriptedTransport {
            chunk_failures: AtomicU32::new(3),
            ..Default::default()
        });
        let (orchestrator, _states) = recording(Arc::clone(&transport));
        let file = csv_file(10);

        assert!(matches!(
            orchestrator.start(&file).await,
            UploadOutcome::Failed { .. }
        ));
        orchestrator.cancel();
        assert!(orchestrator.start(&file).await.is_completed());
    }
}
