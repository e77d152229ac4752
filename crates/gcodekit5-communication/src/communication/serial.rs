//! Real serial port transport
//!
//! Wraps the `serialport` crate's blocking I/O behind the async [`Transport`]
//! trait. A background task owns the blocking reader (via
//! `spawn_blocking`), demultiplexes raw bytes into LF-delimited lines, and
//! feeds them to an unbounded channel `recv_line` awaits on — this is the
//! "demultiplexer" the concurrency model calls for, so the streaming engine
//! itself never blocks.

use super::{ConnectionParams, SerialParity, Transport};
use async_trait::async_trait;
use crate::error::{Error, Result};
use gcodekit5_core::ConnectionError;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Information about an available serial port.
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port_name: String,
    /// Human-readable description.
    pub description: String,
    /// Manufacturer name, if available.
    pub manufacturer: Option<String>,
    /// USB vendor/product IDs, if applicable.
    pub usb_ids: Option<(u16, u16)>,
}

/// List serial ports that look like CNC controllers.
///
/// Filters to the usual patterns: `COM*` on Windows, `/dev/ttyUSB*` /
/// `/dev/ttyACM*` on Linux, `/dev/cu.usbserial-*` / `/dev/cu.usbmodem*` on
/// macOS.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::other(format!("failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_valid_cnc_port(&p.port_name))
        .map(|p| {
            let description = match &p.port_type {
                serialport::SerialPortType::UsbPort(usb) => format!(
                    "USB {} {}",
                    usb.manufacturer.as_deref().unwrap_or("Device"),
                    usb.product.as_deref().unwrap_or("Serial Port")
                ),
                serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
                serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
                _ => "Serial Port".to_string(),
            };
            let (manufacturer, usb_ids) = match &p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    (usb.manufacturer.clone(), Some((usb.vid, usb.pid)))
                }
                _ => (None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                description,
                manufacturer,
                usb_ids,
            }
        })
        .collect())
}

fn is_valid_cnc_port(name: &str) -> bool {
    (name.starts_with("COM") && name[3..].chars().all(|c| c.is_ascii_digit()))
        || name.starts_with("/dev/ttyUSB")
        || name.starts_with("/dev/ttyACM")
        || name.starts_with("/dev/cu.usbserial-")
        || name.starts_with("/dev/cu.usbmodem")
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// An open serial connection to a GRBL/FluidNC controller.
pub struct SerialTransport {
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    connected: Arc<AtomicBool>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl SerialTransport {
    /// Open a serial port with the given parameters and start the
    /// background demultiplexer task.
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(50))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                other => {
                    return Err(ConnectionError::InvalidParameters {
                        reason: format!("invalid data bits: {other}"),
                    }
                    .into())
                }
            })
            .stop_bits(match params.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                other => {
                    return Err(ConnectionError::InvalidParameters {
                        reason: format!("invalid stop bits: {other}"),
                    }
                    .into())
                }
            })
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        let port = builder.open().map_err(|e| ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason: e.to_string(),
        })?;

        let port = Arc::new(Mutex::new(port));
        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_port = port.clone();
        let reader_connected = connected.clone();
        let reader_task = tokio::task::spawn_blocking(move || {
            read_loop(reader_port, reader_connected, tx);
        });

        Ok(Self {
            port,
            inbound: AsyncMutex::new(rx),
            connected,
            reader_task,
        })
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader_task.abort();
    }
}

fn read_loop(
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut buf = [0u8; 256];
    let mut pending = String::new();

    while connected.load(Ordering::SeqCst) {
        let read = {
            let mut guard = match port.lock() {
                Ok(g) => g,
                Err(_) => break,
            };
            guard.read(&mut buf)
        };

        match read {
            Ok(0) => continue,
            Ok(n) => {
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    let line = line.trim().to_string();
                    if !line.is_empty() && tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(_) => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let port = self.port.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|_| Error::other("serial port mutex poisoned"))?;
            guard
                .write_all(&bytes)
                .map_err(|e| ConnectionError::ConnectionLost { reason: e.to_string() }.into())
        })
        .await
        .map_err(|e| Error::other(format!("serial writer task panicked: {e}")))?
    }

    async fn recv_line(&self) -> Result<Option<String>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut rx = self.inbound.lock().await;
        Ok(rx.recv().await)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
