//! Misuse errors returned synchronously by [`StreamingEngine`](super::engine::StreamingEngine)
//! commands.

use super::engine::EngineState;
use thiserror::Error;

/// Represents misuse of the streaming engine's public contract: calling an
/// operation while the engine is in a state that does not support it, or a
/// transport/task failure that prevented the call from being carried out at
/// all.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    /// Controller is not connected.
    #[error("controller not connected")]
    NotConnected,

    /// The program buffer is empty.
    #[error("program is empty")]
    Empty,

    /// `start` was called while a run is already in progress.
    #[error("engine is already running")]
    Busy,

    /// An operation was requested from a state that does not support it.
    #[error("cannot {op}: engine is {current}")]
    WrongState {
        /// The engine's current state.
        current: EngineState,
        /// The operation that was rejected.
        op: &'static str,
    },

    /// The pump task could not be reached.
    #[error("controller error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}
