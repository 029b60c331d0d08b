//! Client configuration.
//!
//! Defaults are compiled in; [`ClientSettings::from_env`] lets a `.env` file or the
//! environment override them, and the CLI flags override both.

use std::env;
use std::time::Duration;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default number of attempts per chunk.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Upload server base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Bytes read from the head of a file for structural validation.
pub const VALIDATION_HEAD_BYTES: u64 = 64 * 1024;

/// Data rows inspected by the structural validator.
pub const VALIDATION_MAX_ROWS: usize = 10;

/// Retry and chunking policy consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Chunk size in bytes. Must be non-zero.
    pub chunk_size: u64,
    /// Attempts per chunk, including the first one.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl UploadConfig {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Number of chunks needed for `size` bytes.
    pub fn chunks_for(&self, size: u64) -> u64 {
        let chunk_size = self.chunk_size.max(1);
        size.div_ceil(chunk_size)
    }
}

/// Everything the CLI needs: where to upload and how.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server_url: String,
    pub upload: UploadConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            upload: UploadConfig::default(),
        }
    }
}

impl ClientSettings {
    /// Read settings from `CHUNKLOAD_*` variables, falling back to defaults.
    ///
    /// Unparsable numbers are ignored with a warning rather than failing startup.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let defaults = UploadConfig::default();
        let server_url =
            env::var("CHUNKLOAD_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let upload = UploadConfig::default()
            .with_chunk_size(env_number("CHUNKLOAD_CHUNK_SIZE").unwrap_or(defaults.chunk_size))
            .with_max_retries(env_number("CHUNKLOAD_MAX_RETRIES").unwrap_or(defaults.max_retries))
            .with_retry_delay_ms(
                env_number("CHUNKLOAD_RETRY_DELAY_MS").unwrap_or(defaults.retry_delay_ms),
            );

        Self { server_url, upload }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
