//! Upload sessions - receive chunks in order and assemble them on disk
//!
//! Each session spools its bytes to `{spool_dir}/{session_id}.part`. Finalizing
//! validates and parses the assembled file into a [`Preview`], after which the
//! spool file is removed and only the preview is kept. Sessions idle for longer
//! than the configured TTL are swept, whatever their status.

use chrono::{DateTime, Utc};
use chunkload::{FileInfo, Preview, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::ServerConfig;
use crate::error::{CsvError, SessionError, SessionResult};
use crate::parser::parse_csv_file_auto;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Receiving,
    /// The file is being parsed outside the store lock
    Finalizing,
    Finalized,
    Failed,
}

/// An upload session with its progress
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: SessionId,
    pub file: FileInfo,
    /// Declared by the first chunk
    pub chunks_total: Option<u64>,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    preview: Option<Preview>,
}

impl UploadSession {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Idle for longer than `ttl` at `now`
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.status != SessionStatus::Finalizing
            && (now - self.updated_at).to_std().is_ok_and(|idle| idle > ttl)
    }

    fn ensure_receiving(&self) -> SessionResult<()> {
        match self.status {
            SessionStatus::Receiving => Ok(()),
            SessionStatus::Finalizing => Err(SessionError::Finalizing(self.id.clone())),
            SessionStatus::Finalized => Err(SessionError::AlreadyFinalized(self.id.clone())),
            SessionStatus::Failed => Err(SessionError::Failed {
                id: self.id.clone(),
                message: self.error.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Acknowledgement of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub chunk_index: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
    /// The chunk had already been stored
    pub duplicate: bool,
}

/// Size limits applied to sessions
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_file_size: u64,
    pub max_chunk_size: u64,
    pub preview_rows: usize,
    /// Idle time before a session is swept
    pub session_ttl: Duration,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_chunk_size: config.max_chunk_size,
            preview_rows: config.preview_rows,
            session_ttl: config.session_ttl(),
        }
    }
}

/// In-memory session registry backed by spool files
pub struct SessionStore {
    /// Directory where partial uploads are written
    spool_dir: PathBuf,
    limits: SessionLimits,
    sessions: Mutex<HashMap<SessionId, UploadSession>>,
}

impl SessionStore {
    pub fn new(spool_dir: impl AsRef<Path>, limits: SessionLimits) -> Self {
        Self {
            spool_dir: spool_dir.as_ref().to_path_buf(),
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.spool_dir, SessionLimits::from(config))
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    fn spool_path(&self, id: &str) -> PathBuf {
        self.spool_dir.join(format!("{}.part", id))
    }

    /// Open a session for `file`
    pub async fn create(&self, file: FileInfo) -> SessionResult<UploadSession> {
        if file.size == 0 {
            return Err(SessionError::EmptyFile);
        }
        if file.size > self.limits.max_file_size {
            return Err(SessionError::FileTooLarge {
                size: file.size,
                max: self.limits.max_file_size,
            });
        }

        let id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.spool_dir).await?;
        tokio::fs::File::create(self.spool_path(&id)).await?;

        let now = Utc::now();
        let session = UploadSession {
            id: id.clone(),
            file,
            chunks_total: None,
            chunks_received: 0,
            bytes_received: 0,
            status: SessionStatus::Receiving,
            error: None,
            created_at: now,
            updated_at: now,
            preview: None,
        };

        log_info(format!(
            "Session {} opened for {} ({} bytes)",
            id, session.file.name, session.file.size
        ));
        self.sessions.lock().await.insert(id, session.clone());
        Ok(session)
    }

    /// Snapshot of a session
    pub async fn get(&self, id: &str) -> SessionResult<UploadSession> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Store chunk `index` of `total` at the end of the acknowledged bytes.
    ///
    /// Chunks must arrive in order. Re-sending an already stored chunk is
    /// acknowledged without writing it again. Bytes left past the acknowledged
    /// length by a failed write are overwritten.
    pub async fn accept_chunk(
        &self,
        id: &str,
        index: u64,
        total: u64,
        data: &[u8],
    ) -> SessionResult<ChunkAck> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.ensure_receiving()?;

        let size = data.len() as u64;
        if size > self.limits.max_chunk_size {
            return Err(SessionError::ChunkTooLarge {
                size,
                max: self.limits.max_chunk_size,
            });
        }

        if let Some(expected) = session.chunks_total.filter(|&expected| expected != total) {
            return Err(SessionError::TotalMismatch { expected, got: total });
        }
        if index >= total {
            return Err(SessionError::InvalidIndex { index, total });
        }

        if index < session.chunks_received {
            log_warning(format!("Session {}: chunk {} already stored", id, index));
            return Ok(ChunkAck {
                chunk_index: index,
                chunks_received: session.chunks_received,
                bytes_received: session.bytes_received,
                duplicate: true,
            });
        }
        if index > session.chunks_received {
            return Err(SessionError::OutOfOrder {
                expected: session.chunks_received,
                got: index,
            });
        }

        let received = session.bytes_received + size;
        if received > session.file.size {
            return Err(SessionError::Overflow {
                received,
                size: session.file.size,
            });
        }

        let mut spool = tokio::fs::OpenOptions::new()
            .write(true)
            .open(self.spool_path(id))
            .await?;
        spool.set_len(session.bytes_received).await?;
        spool.seek(SeekFrom::Start(session.bytes_received)).await?;
        spool.write_all(data).await?;
        spool.flush().await?;

        session.chunks_total = Some(total);
        session.chunks_received += 1;
        session.bytes_received = received;
        session.touch();

        Ok(ChunkAck {
            chunk_index: index,
            chunks_received: session.chunks_received,
            bytes_received: session.bytes_received,
            duplicate: false,
        })
    }

    /// Assemble, validate and parse the upload.
    ///
    /// The file is parsed on the blocking pool without holding the store lock.
    /// Invalid content fails the session for good.
    pub async fn finalize(&self, id: &str) -> SessionResult<Preview> {
        {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            session.ensure_receiving()?;

            if session.bytes_received != session.file.size {
                return Err(SessionError::Incomplete {
                    received: session.bytes_received,
                    size: session.file.size,
                });
            }
            session.status = SessionStatus::Finalizing;
            session.touch();
        }

        let path = self.spool_path(id);
        let parse_path = path.clone();
        let session_id = id.to_string();
        let preview_rows = self.limits.preview_rows;
        let parsed = tokio::task::spawn_blocking(move || {
            parse_csv_file_auto(&parse_path).map(|p| p.into_preview(&session_id, preview_rows))
        })
        .await
        .unwrap_or_else(|e| Err(CsvError::IoError(std::io::Error::other(e))));
        remove_spool(&path).await;

        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        match parsed {
            Ok(preview) => {
                log_success(format!(
                    "Session {} finalized: {} rows, {} columns",
                    id,
                    preview.total_rows,
                    preview.columns.len()
                ));
                session.status = SessionStatus::Finalized;
                session.preview = Some(preview.clone());
                session.touch();
                Ok(preview)
            }
            Err(e) => {
                log_error(format!("Session {} rejected: {}", id, e));
                session.status = SessionStatus::Failed;
                session.error = Some(e.to_string());
                session.touch();
                Err(e.into())
            }
        }
    }

    /// The preview of a finalized session
    pub async fn preview(&self, id: &str) -> SessionResult<Preview> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        match (&session.status, &session.preview) {
            (SessionStatus::Finalized, Some(preview)) => Ok(preview.clone()),
            _ => Err(SessionError::NotFinalized(id.to_string())),
        }
    }

    /// Number of sessions in memory
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drop every session idle for longer than the TTL at `now`, with its spool
    /// file or preview. Returns the number of sessions dropped.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.limits.session_ttl;
        let mut expired = Vec::new();
        self.sessions.lock().await.retain(|id, session| {
            let keep = !session.is_expired(now, ttl);
            if !keep {
                expired.push(id.clone());
            }
            keep
        });

        for id in &expired {
            remove_spool(&self.spool_path(id)).await;
            log_info(format!("Session {} expired", id));
        }
        expired.len()
    }

    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }
}

/// Sweep expired sessions of `store` every `every`
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            store.sweep_expired().await;
        }
    })
}

async fn remove_spool(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log_warning(format!("Could not remove {}: {}", path.display(), e)),
    }
}
