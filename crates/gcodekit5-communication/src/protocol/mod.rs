//! The GRBL/FluidNC wire dialect: response classification and status parsing.

pub mod error_decoder;
pub mod response;
pub mod status;

pub use response::Response;
pub use status::{BufferState, OverrideState, Position3, StatusReport};
