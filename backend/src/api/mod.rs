//! HTTP API module.
//!
//! This module provides the HTTP server and API types for the chunkload server.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
