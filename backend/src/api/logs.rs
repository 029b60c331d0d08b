//! Server activity feed via Server-Sent Events (SSE).
//!
//! Session events are echoed to stdout and broadcast to every connected SSE
//! client. The last [`HISTORY_SIZE`] entries are replayed to new subscribers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Entries replayed to a new subscriber
pub const HISTORY_SIZE: usize = 50;

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
    history: Mutex<VecDeque<LogEntry>>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_SIZE)),
        }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, entry: LogEntry) {
        let prefix = match entry.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        println!("{} {}", prefix, entry.message);

        // Recorded and sent under one lock, so a subscriber sees each entry once.
        let mut history = self.lock_history();
        if history.len() == HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(entry.clone());

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Most recent entries, oldest first, and a receiver for every entry logged
    /// after them
    pub fn subscribe_with_history(&self) -> (Vec<LogEntry>, broadcast::Receiver<LogEntry>) {
        let history = self.lock_history();
        (history.iter().cloned().collect(), self.sender.subscribe())
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Info, msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Success, msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Warning, msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Error, msg));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let broadcaster = LogBroadcaster::new();
        let (_, mut rx) = broadcaster.subscribe_with_history();

        broadcaster.log(LogEntry::new(LogLevel::Success, "Session finalized"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "Session finalized");
    }

    #[test]
    fn test_history_is_bounded() {
        let broadcaster = LogBroadcaster::new();
        for i in 0..HISTORY_SIZE + 5 {
            broadcaster.log(LogEntry::new(LogLevel::Info, format!("entry {}", i)));
        }

        let (recent, _) = broadcaster.subscribe_with_history();
        assert_eq!(recent.len(), HISTORY_SIZE);
        assert_eq!(recent[0].message, "entry 5");
    }

    #[test]
    fn test_entry_is_either_history_or_live() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.log(LogEntry::new(LogLevel::Info, "before"));

        let (history, mut rx) = broadcaster.subscribe_with_history();
        broadcaster.log(LogEntry::new(LogLevel::Info, "after"));

        let history: Vec<_> = history.into_iter().map(|e| e.message).collect();
        assert_eq!(history, vec!["before"]);
        assert_eq!(rx.try_recv().unwrap().message, "after");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LogEntry::new(LogLevel::Warning, "chunk 3 already stored");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warning");
        assert!(json["timestamp"].is_string());
    }
}
