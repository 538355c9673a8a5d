//! Error types and result handling for pulsar-bridge.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Only [`Error::Connection`] (and configuration problems surfaced while
//! connecting) is fatal: it aborts plugin initialization. Every other
//! variant is scoped to a single record or a single flush and is logged
//! and counted by the batch driver.
//!
//! # Example
//!
//! ```rust
//! use pulsar_bridge::{Error, Result};
//!
//! fn connect_to_broker() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("broker unreachable".to_string()))
//! }
//!
//! match connect_to_broker() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for pulsar-bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically an unreadable configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker unreachable or producer creation rejected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pulsar client or protocol error.
    #[error("Pulsar error: {0}")]
    Pulsar(#[from] pulsar::Error),

    /// A record could not be converted into a string-keyed structure.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of the offending shape
        message: String,
    },

    /// JSON encoding of a normalized record failed.
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The transport rejected a message dispatch.
    #[error("Send error: {message}")]
    Send {
        /// Description reported by the transport
        message: String,
    },

    /// A periodic flush did not get acknowledged by the broker.
    #[error("Flush error: {message}")]
    Flush {
        /// Description of what failed
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// The host batch buffer could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what was invalid
        message: String,
    },

    /// I/O error, typically from reading a batch buffer or config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The delivery channel was used before a successful initialization.
    #[error("Delivery channel is not initialized")]
    NotInitialized,
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// A convenient Result type alias for pulsar-bridge operations.
///
/// This is equivalent to `std::result::Result<T, pulsar_bridge::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
