//! # GCodeKit5 Core
//!
//! Connection-level transport error taxonomy shared by the streaming engine
//! and anything else in the workspace that opens a serial port.

pub mod error;

pub use error::ConnectionError;
