//! # GCodeKit5 Communication
//!
//! A GRBL/FluidNC g-code streaming engine: response classification, status
//! report parsing, serial transport, and the [`StreamingEngine`] state
//! machine that drives lock-step line-by-line delivery.

pub mod communication;
pub mod error;
pub mod protocol;
pub mod streaming;

pub use communication::{ConnectionParams, SerialParity, Transport};
pub use communication::serial::{list_ports, SerialPortInfo, SerialTransport};
pub use error::{Error, Result};
pub use protocol::{BufferState, OverrideState, Position3, Response, StatusReport};
pub use streaming::{
    ControllerError, Cursors, EngineConfig, EngineEvent, EngineSnapshot, EngineState,
    ObserverSink, Program, ProgramLine, RetryState, StreamingEngine,
};
