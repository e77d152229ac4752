//! Reference CLI: stream a g-code file to a GRBL/FluidNC controller.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use gcodekit5::{
    init_logging, ConnectionParams, EngineConfig, EngineEvent, EngineState, SerialTransport,
    StreamingEngine,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "gcodekit5", version, about = "Stream g-code to a GRBL/FluidNC controller")]
struct Cli {
    /// Path to the g-code file to stream.
    file: PathBuf,

    /// Serial port to open, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long)]
    port: String,

    /// Baud rate.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Enable check (dry-run) mode for the duration of the run.
    #[arg(long)]
    check: bool,

    /// Per-line retry budget before pausing.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Omit the `N<k>` line-number prefix from outbound lines.
    #[arg(long)]
    no_line_numbers: bool,
}

fn main() -> ExitCode {
    if let Err(err) = init_logging() {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::from(1);
    }

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(stream(cli))
}

async fn stream(cli: Cli) -> ExitCode {
    let text = match std::fs::read_to_string(&cli.file) {
        Ok(text) => text,
        Err(err) => {
            error!(path = %cli.file.display(), %err, "failed to read g-code file");
            return ExitCode::from(1);
        }
    };

    let params = ConnectionParams { port: cli.port.clone(), baud_rate: cli.baud, ..Default::default() };
    let transport = match SerialTransport::open(&params) {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            error!(port = %cli.port, %err, "failed to open serial port");
            return ExitCode::from(1);
        }
    };

    let config = EngineConfig {
        max_retries: cli.max_retries,
        use_line_numbers: !cli.no_line_numbers,
        check_mode: cli.check,
        ..EngineConfig::default()
    };

    let engine = StreamingEngine::new(transport, config);
    let mut events = engine.subscribe();
    engine.load(&text).await;

    if let Err(err) = engine.start().await {
        error!(%err, "failed to start streaming run");
        return ExitCode::from(1);
    }
    info!(file = %cli.file.display(), port = %cli.port, "streaming started");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else { break };
                if let Some(code) = report(&event) {
                    return code;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, stopping run");
                engine.stop().await;
                println!();
                return ExitCode::from(2);
            }
        }
    }

    match engine.snapshot().state {
        EngineState::Faulted => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

/// Print one engine event to the console; returns the process exit code if
/// this event ends the run.
fn report(event: &EngineEvent) -> Option<ExitCode> {
    match event {
        EngineEvent::Progress { sent, acknowledged, total, percent } => {
            print!("\rsent {sent}/{total}  acked {acknowledged}/{total}  ({percent:5.1}%)");
            let _ = std::io::stdout().flush();
            None
        }
        EngineEvent::LineError { index, reason, .. } => {
            println!();
            println!("line {index} failed: {reason}");
            None
        }
        EngineEvent::Complete { total } => {
            println!();
            info!(total, "all lines sent and acknowledged");
            None
        }
        EngineEvent::ExecutionComplete { total } => {
            println!();
            info!(total, "execution complete");
            Some(ExitCode::from(0))
        }
        EngineEvent::Pause { reason } => {
            println!();
            info!(%reason, "run paused; no interactive operator to resume it");
            Some(ExitCode::from(2))
        }
        EngineEvent::Error { message } => {
            println!();
            error!(%message, "engine faulted");
            Some(ExitCode::from(1))
        }
        _ => None,
    }
}
