//! Upload state machine.
//!
//! [`transition`] is a pure function over a closed set of phases and events.
//! Combinations outside the table below leave the state unchanged.
//!
//! ```text
//!            FileSelected           ValidationPassed          ChunkSent (last)
//!   Idle ───────────────▶ Validating ───────────────▶ Uploading ───────────────▶ Finalizing
//!   Done ─┘                  │                        │  ▲   │                     │
//!   Error ┘                  │ ValidationFailed       │  └───┘ ChunkSent           │ FinalizeSuccess
//!                            ▼                        │ ChunkFailed                ▼
//!                   Error(retryable=false)            ▼                          Done
//!                                            Error(retryable=true) ◀──────── FinalizeFailed
//!
//!   Cancel: Validating | Uploading | Finalizing ──▶ Idle      Reset: any ──▶ Idle
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FileInfo, SessionId};

/// Phase of a single upload attempt, with phase-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UploadState {
    #[default]
    Idle,

    Validating {
        file: FileInfo,
    },

    #[serde(rename_all = "camelCase")]
    Uploading {
        file: FileInfo,
        session_id: SessionId,
        bytes_sent: u64,
        bytes_total: u64,
        chunks_completed: u64,
        chunks_total: u64,
    },

    #[serde(rename_all = "camelCase")]
    Finalizing {
        file: FileInfo,
        session_id: SessionId,
    },

    #[serde(rename_all = "camelCase")]
    Done {
        session_id: SessionId,
    },

    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        retryable: bool,
        file: Option<FileInfo>,
        session_id: Option<SessionId>,
    },
}

/// The only way to move an [`UploadState`] forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    FileSelected { file: FileInfo },
    ValidationPassed { session_id: SessionId, chunks_total: u64 },
    ValidationFailed { message: String },
    /// `bytes_sent` is the absolute end offset of the acknowledged chunk.
    ChunkSent { bytes_sent: u64 },
    ChunkFailed { message: String },
    FinalizeSuccess,
    FinalizeFailed { message: String },
    Cancel,
    Reset,
}

/// Coarse phase tag, handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Validating,
    Uploading,
    Finalizing,
    Done,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Uploading => "uploading",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

impl UploadState {
    pub fn phase(&self) -> Phase {
        match self {
            UploadState::Idle => Phase::Idle,
            UploadState::Validating { .. } => Phase::Validating,
            UploadState::Uploading { .. } => Phase::Uploading,
            UploadState::Finalizing { .. } => Phase::Finalizing,
            UploadState::Done { .. } => Phase::Done,
            UploadState::Error { .. } => Phase::Error,
        }
    }

    /// An attempt is in flight: validating, uploading or finalizing.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            UploadState::Validating { .. }
                | UploadState::Uploading { .. }
                | UploadState::Finalizing { .. }
        )
    }

    /// Idle, done or failed: a new file may be selected.
    pub fn accepts_file(&self) -> bool {
        !self.is_active()
    }

    /// Transfer progress in percent, when uploading.
    pub fn progress_percent(&self) -> Option<f64> {
        match self {
            UploadState::Uploading { bytes_sent, bytes_total, .. } if *bytes_total > 0 => {
                Some(*bytes_sent as f64 / *bytes_total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// Compute the next state. Pure and total.
pub fn transition(state: &UploadState, event: &UploadEvent) -> UploadState {
    // Universal escapes first.
    match event {
        UploadEvent::Reset => return UploadState::Idle,
        UploadEvent::Cancel => {
            return if state.is_active() {
                UploadState::Idle
            } else {
                state.clone()
            };
        }
        _ => {}
    }

    match (state, event) {
        (s, UploadEvent::FileSelected { file }) if s.accepts_file() => {
            UploadState::Validating { file: file.clone() }
        }

        (
            UploadState::Validating { file },
            UploadEvent::ValidationPassed { session_id, chunks_total },
        ) => UploadState::Uploading {
            file: file.clone(),
            session_id: session_id.clone(),
            bytes_sent: 0,
            bytes_total: file.size,
            chunks_completed: 0,
            chunks_total: *chunks_total,
        },

        (UploadState::Validating { file }, UploadEvent::ValidationFailed { message }) => {
            UploadState::Error {
                message: message.clone(),
                retryable: false,
                file: Some(file.clone()),
                session_id: None,
            }
        }

        (
            UploadState::Uploading {
                file,
                session_id,
                bytes_total,
                chunks_completed,
                chunks_total,
                ..
            },
            UploadEvent::ChunkSent { bytes_sent },
        ) => {
            let completed = chunks_completed + 1;
            if completed < *chunks_total {
                UploadState::Uploading {
                    file: file.clone(),
                    session_id: session_id.clone(),
                    bytes_sent: (*bytes_sent).min(*bytes_total),
                    bytes_total: *bytes_total,
                    chunks_completed: completed,
                    chunks_total: *chunks_total,
                }
            } else {
                UploadState::Finalizing {
                    file: file.clone(),
                    session_id: session_id.clone(),
                }
            }
        }

        (UploadState::Uploading { file, session_id, .. }, UploadEvent::ChunkFailed { message }) => {
            UploadState::Error {
                message: message.clone(),
                retryable: true,
                file: Some(file.clone()),
                session_id: Some(session_id.clone()),
            }
        }

        (UploadState::Finalizing { session_id, .. }, UploadEvent::FinalizeSuccess) => {
            UploadState::Done { session_id: session_id.clone() }
        }

        (UploadState::Finalizing { file, session_id }, UploadEvent::FinalizeFailed { message }) => {
            UploadState::Error {
                message: message.clone(),
                retryable: true,
                file: Some(file.clone()),
                session_id: Some(session_id.clone()),
            }
        }

        (s, _) => s.clone(),
    }
}

/// `Validating` to a retryable `Error` when no session could be opened.
///
/// Goes through `ValidationPassed` and `ChunkFailed` in the table above. The
/// intermediate `Uploading` state is never returned and no session id is kept.
pub fn initialize_failed(state: &UploadState, message: &str) -> UploadState {
    if state.phase() != Phase::Validating {
        return state.clone();
    }

    let shim = transition(
        state,
        &UploadEvent::ValidationPassed { session_id: SessionId::new(), chunks_total: 1 },
    );
    match transition(&shim, &UploadEvent::ChunkFailed { message: message.to_string() }) {
        UploadState::Error { message, retryable, file, .. } => UploadState::Error {
            message,
            retryable,
            file,
            session_id: None,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(size: u64) -> FileInfo {
        FileInfo::new("data.csv", size, "text/csv")
    }

    fn uploading(completed: u64, total: u64) -> UploadState {
        UploadState::Uploading {
            file: file(4096),
            session_id: "s1".into(),
            bytes_sent: completed * 1024,
            bytes_total: 4096,
            chunks_completed: completed,
            chunks_total: total,
        }
    }

    fn sample_states() -> Vec<UploadState> {
        vec![
            UploadState::Idle,
            UploadState::Validating { file: file(10) },
            uploading(0, 4),
            uploading(3, 4),
            UploadState::Finalizing { file: file(10), session_id: "s1".into() },
            UploadState::Done { session_id: "s1".into() },
            UploadState::Error {
                message: "boom".into(),
                retryable: true,
                file: Some(file(10)),
                session_id: None,
            },
        ]
    }

    fn sample_events() -> Vec<UploadEvent> {
        vec![
            UploadEvent::FileSelected { file: file(20) },
            UploadEvent::ValidationPassed { session_id: "s2".into(), chunks_total: 2 },
            UploadEvent::ValidationFailed { message: "bad".into() },
            UploadEvent::ChunkSent { bytes_sent: 1024 },
            UploadEvent::ChunkFailed { message: "net".into() },
            UploadEvent::FinalizeSuccess,
            UploadEvent::FinalizeFailed { message: "assembly".into() },
            UploadEvent::Cancel,
            UploadEvent::Reset,
        ]
    }

    /// Pairs from the transition table that change the state.
    fn is_legal(state: &UploadState, event: &UploadEvent) -> bool {
        use UploadEvent as E;
        match event {
            E::Reset => true,
            E::Cancel => state.is_active(),
            E::FileSelected { .. } => state.accepts_file(),
            E::ValidationPassed { .. } | E::ValidationFailed { .. } => {
                state.phase() == Phase::Validating
            }
            E::ChunkSent { .. } | E::ChunkFailed { .. } => state.phase() == Phase::Uploading,
            E::FinalizeSuccess | E::FinalizeFailed { .. } => state.phase() == Phase::Finalizing,
        }
    }

    #[test]
    fn test_file_selected_from_terminal_phases() {
        for state in sample_states().into_iter().filter(|s| s.accepts_file()) {
            let next = transition(&state, &UploadEvent::FileSelected { file: file(7) });
            assert_eq!(next, UploadState::Validating { file: file(7) });
        }
    }

    #[test]
    fn test_validation_passed_starts_upload() {
        let state = UploadState::Validating { file: file(2048) };
        let next = transition(
            &state,
            &UploadEvent::ValidationPassed { session_id: "abc".into(), chunks_total: 2 },
        );

        assert_eq!(
            next,
            UploadState::Uploading {
                file: file(2048),
                session_id: "abc".into(),
                bytes_sent: 0,
                bytes_total: 2048,
                chunks_completed: 0,
                chunks_total: 2,
            }
        );
    }

    #[test]
    fn test_validation_failed_is_not_retryable() {
        let state = UploadState::Validating { file: file(0) };
        let next = transition(&state, &UploadEvent::ValidationFailed { message: "empty".into() });

        match next {
            UploadState::Error { retryable, file: f, session_id, .. } => {
                assert!(!retryable);
                assert_eq!(f, Some(file(0)));
                assert_eq!(session_id, None);
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_chunk_sent_advances_then_finalizes() {
        let next = transition(&uploading(0, 2), &UploadEvent::ChunkSent { bytes_sent: 1024 });
        match &next {
            UploadState::Uploading { bytes_sent, chunks_completed, .. } => {
                assert_eq!(*bytes_sent, 1024);
                assert_eq!(*chunks_completed, 1);
            }
            other => panic!("Expected Uploading, got {:?}", other),
        }

        let last = transition(&next, &UploadEvent::ChunkSent { bytes_sent: 2048 });
        assert_eq!(last.phase(), Phase::Finalizing);
    }

    #[test]
    fn test_chunk_failed_keeps_session() {
        let next = transition(&uploading(1, 4), &UploadEvent::ChunkFailed { message: "net".into() });
        assert_eq!(
            next,
            UploadState::Error {
                message: "net".into(),
                retryable: true,
                file: Some(file(4096)),
                session_id: Some("s1".into()),
            }
        );
    }

    #[test]
    fn test_initialize_failed_has_no_session() {
        let next = initialize_failed(&UploadState::Validating { file: file(10) }, "offline");

        assert_eq!(
            next,
            UploadState::Error {
                message: "offline".into(),
                retryable: true,
                file: Some(file(10)),
                session_id: None,
            }
        );
        for state in sample_states().into_iter().filter(|s| s.phase() != Phase::Validating) {
            assert_eq!(initialize_failed(&state, "offline"), state);
        }
    }

    #[test]
    fn test_chunk_failed_keeps_an_empty_server_id() {
        let uploading = transition(
            &UploadState::Validating { file: file(10) },
            &UploadEvent::ValidationPassed { session_id: String::new(), chunks_total: 1 },
        );
        let next = transition(&uploading, &UploadEvent::ChunkFailed { message: "net".into() });

        match next {
            UploadState::Error { session_id, .. } => assert_eq!(session_id, Some(String::new())),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_finalize_outcomes() {
        let finalizing = UploadState::Finalizing { file: file(10), session_id: "s9".into() };

        assert_eq!(
            transition(&finalizing, &UploadEvent::FinalizeSuccess),
            UploadState::Done { session_id: "s9".into() }
        );

        match transition(&finalizing, &UploadEvent::FinalizeFailed { message: "x".into() }) {
            UploadState::Error { retryable, session_id, .. } => {
                assert!(retryable);
                assert_eq!(session_id.as_deref(), Some("s9"));
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_universal_escape() {
        for state in sample_states() {
            assert_eq!(transition(&state, &UploadEvent::Reset), UploadState::Idle);

            let cancelled = transition(&state, &UploadEvent::Cancel);
            if state.is_active() {
                assert_eq!(cancelled, UploadState::Idle);
            } else {
                assert_eq!(cancelled, state, "terminal phases ignore Cancel");
            }
        }
    }

    #[test]
    fn test_illegal_pairs_are_no_ops() {
        for state in sample_states() {
            for event in sample_events() {
                if !is_legal(&state, &event) {
                    assert_eq!(
                        transition(&state, &event),
                        state,
                        "{:?} + {:?} should be a no-op",
                        state.phase(),
                        event
                    );
                }
            }
        }
    }

    #[test]
    fn test_transition_is_deterministic() {
        for state in sample_states() {
            for event in sample_events() {
                assert_eq!(transition(&state, &event), transition(&state, &event));
            }
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(uploading(2, 4).progress_percent(), Some(50.0));
        assert_eq!(UploadState::Idle.progress_percent(), None);
    }

    #[test]
    fn test_state_serializes_with_status_tag() {
        let json = serde_json::to_value(UploadState::Done { session_id: "s1".into() }).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["sessionId"], "s1");
    }
}
