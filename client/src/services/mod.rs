//! Concrete transports.

pub mod upload;

pub use upload::HttpTransport;
