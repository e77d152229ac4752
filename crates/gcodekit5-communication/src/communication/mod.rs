//! The byte-level transport the streaming engine talks through.
//!
//! This is deliberately the thin external boundary spec.md calls the
//! "Serial Transport": write bytes, get a stream of inbound ASCII lines,
//! know whether you're connected. The engine itself never reaches into
//! `serialport` directly; it only ever sees [`Transport`].

pub mod serial;

use crate::error::Result;
use async_trait::async_trait;

/// Serial line parameters for opening a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// OS port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate, e.g. 115200.
    pub baud_rate: u32,
    /// Data bits, 5-8.
    pub data_bits: u8,
    /// Stop bits, 1 or 2.
    pub stop_bits: u8,
    /// Parity mode.
    pub parity: SerialParity,
    /// Hardware flow control.
    pub flow_control: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialParity {
    /// No parity bit.
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

/// A full-duplex, line-oriented link to a motion controller.
///
/// Implementors own their own demultiplexing of raw bytes into LF-delimited
/// ASCII lines; [`Transport::recv_line`] hands the streaming engine one
/// complete line at a time, with the trailing newline already stripped.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write raw bytes (a composed `N<k> <payload>\n` line, or a bare
    /// real-time command byte) to the controller.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Wait for and return the next complete inbound line. Returns `Ok(None)`
    /// if the transport was closed with no more data pending.
    async fn recv_line(&self) -> Result<Option<String>>;

    /// Whether the transport currently believes it is connected.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
pub use test_support::MockTransport;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Mutex as AsyncMutex};

    /// An in-memory transport for tests: inbound lines are fed in up front
    /// (or pushed later via [`MockTransport::push_line`]), outbound writes
    /// are recorded for assertions.
    pub struct MockTransport {
        inbound_tx: mpsc::UnboundedSender<String>,
        inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
        writes: Mutex<Vec<Vec<u8>>>,
        connected: std::sync::atomic::AtomicBool,
    }

    impl MockTransport {
        /// Create a transport with no inbound lines queued yet.
        pub fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                inbound_tx: tx,
                inbound_rx: AsyncMutex::new(rx),
                writes: Mutex::new(Vec::new()),
                connected: std::sync::atomic::AtomicBool::new(true),
            }
        }

        /// Queue a line to be returned by a future `recv_line` call.
        pub fn push_line(&self, line: impl Into<String>) {
            let _ = self.inbound_tx.send(line.into());
        }

        /// All bytes written so far, in order.
        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }

        /// Lines written through the line-oriented path, decoded as UTF-8.
        pub fn written_lines(&self) -> Vec<String> {
            self.writes()
                .into_iter()
                .map(|b| String::from_utf8_lossy(&b).trim_end().to_string())
                .collect()
        }

        /// Simulate a disconnect: further `recv_line` calls return `Ok(None)`.
        pub fn disconnect(&self) {
            self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
            drop(self.inbound_tx.clone());
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn write(&self, bytes: &[u8]) -> Result<()> {
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        async fn recv_line(&self) -> Result<Option<String>> {
            if !self.connected.load(std::sync::atomic::Ordering::SeqCst) {
                return Ok(None);
            }
            let mut rx = self.inbound_rx.lock().await;
            Ok(rx.recv().await)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::SeqCst)
        }
    }
}
