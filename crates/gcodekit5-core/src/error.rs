//! Error handling for GCodeKit5
//!
//! Provides the connection-level transport error taxonomy shared by every
//! crate that talks to a serial port. The streaming engine's own
//! controller-level error type lives in `gcodekit5-communication` instead,
//! since it carries an `EngineState` field and this crate must not depend
//! back on its own dependent.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to communication with CNC controllers over the
/// serial transport.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Port not found
    #[error("port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("serial port error: {reason}")]
    SerialError {
        /// The reason for the serial error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Generic connection error
    #[error("connection error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}
