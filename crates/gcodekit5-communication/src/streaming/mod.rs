//! The streaming engine and its supporting types.

pub mod config;
pub mod cursors;
pub mod engine;
pub mod error;
pub mod observer;
pub mod program;

pub use config::EngineConfig;
pub use cursors::{Cursors, RetryState};
pub use engine::{EngineSnapshot, EngineState, StreamingEngine};
pub use error::ControllerError;
pub use observer::{EngineEvent, ObserverSink};
pub use program::{Program, ProgramLine};
