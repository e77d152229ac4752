//! # GCodeKit5
//!
//! A G-code streaming engine for GRBL/FluidNC CNC controllers.
//!
//! ## Architecture
//!
//! GCodeKit5 is organized as a workspace:
//!
//! 1. **gcodekit5-core** - connection-level transport error taxonomy
//! 2. **gcodekit5-communication** - the streaming engine: response parsing,
//!    status reports, serial transport, the protocol state machine, and the
//!    engine's own `ControllerError`/`Error` types
//! 3. **gcodekit5** - the reference CLI binary that drives the engine
//!
//! The editor, 3D visualizer, CAM tooling, and device-profile database that
//! once lived alongside the engine are out of scope here: this crate only
//! streams G-code.

pub use gcodekit5_communication::{
    list_ports, ConnectionParams, ControllerError, EngineConfig, EngineEvent, EngineSnapshot,
    EngineState, Error, Result, SerialParity, SerialPortInfo, SerialTransport, StreamingEngine,
    Transport,
};
pub use gcodekit5_core::ConnectionError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - `RUST_LOG` environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    // In Windows GUI mode (release builds), log to a file instead of stdout.
    #[cfg(all(target_os = "windows", not(debug_assertions)))]
    {
        use std::fs::OpenOptions;

        let log_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        let log_file = log_dir.join("gcodekit5.log");

        match OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(file) => {
                let fmt_layer = fmt::layer()
                    .with_writer(file)
                    .with_target(true)
                    .with_level(true)
                    .with_line_number(true)
                    .pretty();

                tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
            }
            Err(_) => {
                tracing_subscriber::registry().with(env_filter).init();
            }
        }
    }

    #[cfg(not(all(target_os = "windows", not(debug_assertions))))]
    {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true).with_level(true);

        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
    }

    Ok(())
}
