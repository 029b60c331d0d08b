//! Server configuration, read from `CHUNKLOAD_*` variables or a `.env` file.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Directory where partial uploads are spooled (relative to current dir)
pub const DEFAULT_SPOOL_DIR: &str = ".chunkload/spool";

pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted file: 1 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Largest accepted chunk: 8 MiB, room for the client's 1 MiB default.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Rows kept in a preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Idle time after which a session and its spool file are dropped: 1 hour.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub spool_dir: PathBuf,
    pub max_file_size: u64,
    pub max_chunk_size: u64,
    pub preview_rows: usize,
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl ServerConfig {
    /// Create a config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            port: env_parse("CHUNKLOAD_PORT").unwrap_or(defaults.port),
            spool_dir: env::var("CHUNKLOAD_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.spool_dir),
            max_file_size: env_parse("CHUNKLOAD_MAX_FILE_SIZE").unwrap_or(defaults.max_file_size),
            max_chunk_size: env_parse("CHUNKLOAD_MAX_CHUNK_SIZE")
                .unwrap_or(defaults.max_chunk_size),
            preview_rows: env_parse("CHUNKLOAD_PREVIEW_ROWS").unwrap_or(defaults.preview_rows),
            session_ttl_secs: env_parse("CHUNKLOAD_SESSION_TTL_SECS")
                .unwrap_or(defaults.session_ttl_secs),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default().with_port(8080).with_spool_dir("/tmp/spool");
        assert_eq!(config.port, 8080);
        assert_eq!(config.spool_dir, PathBuf::from("/tmp/spool"));
        assert!(config.max_chunk_size >= chunkload::config::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
    }
}
