//! Serial transport for a gateway node on a USB-serial adapter.
//!
//! The port is blocking, so it is driven from a dedicated blocking task. The
//! same task writes queued command lines between reads; the short read
//! timeout bounds how long a command waits.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tokio::sync::mpsc;

use super::CommandLink;

/// Unterminated input beyond this many bytes is cut back.
pub const LINE_BUFFER_CAP: usize = 10_000;

/// Bytes kept when the buffer is cut back.
pub const LINE_BUFFER_KEEP: usize = 1_000;

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const REOPEN_BACKOFF: Duration = Duration::from_secs(1);
const COMMAND_QUEUE_DEPTH: usize = 8;

/// Substrings of common USB-serial bridge descriptions on ESP32 boards.
const KNOWN_BRIDGES: &[&str] = &["cp210", "ch340", "ftdi", "silicon labs", "usb serial"];

/// Splits a byte stream into lines.
///
/// Carriage returns before the newline are dropped and empty lines are
/// skipped. A partial line that grows past the cap is cut back to its
/// most recent bytes so a device that never sends a newline cannot exhaust
/// memory.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    cap: usize,
    keep: usize,
}

impl LineBuffer {
    pub fn new(cap: usize, keep: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            keep: keep.min(cap),
        }
    }

    /// Append `chunk` and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.keep;
            self.buf.drain(..excess);
        }

        lines
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(LINE_BUFFER_CAP, LINE_BUFFER_KEEP)
    }
}

/// Find a port whose USB description looks like a known serial bridge.
pub fn detect_port() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!(error = %e, "could not list serial ports");
            return None;
        }
    };

    ports.into_iter().find_map(|port| {
        let SerialPortType::UsbPort(usb) = &port.port_type else {
            return None;
        };
        let description = [usb.product.as_deref(), usb.manufacturer.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        KNOWN_BRIDGES
            .iter()
            .any(|chip| description.contains(chip))
            .then(|| {
                tracing::info!(port = %port.port_name, %description, "auto-detected gateway port");
                port.port_name
            })
    })
}

/// Serial line transport with reconnect.
#[derive(Debug, Clone)]
pub struct SerialSource {
    port: String,
    baud: u32,
}

impl SerialSource {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
        }
    }

    /// Start reading. Returns the link commands are written through.
    ///
    /// A fault closes the port and it is reopened after a pause; this
    /// repeats until the unit receiver is dropped.
    pub fn spawn(self, tx: mpsc::Sender<String>) -> (CommandLink, tokio::task::JoinHandle<()>) {
        let (link, commands) = CommandLink::channel(COMMAND_QUEUE_DEPTH);
        let task_link = link.clone();

        let handle = tokio::task::spawn_blocking(move || {
            self.run(&tx, commands, &task_link);
        });

        (link, handle)
    }

    fn run(&self, tx: &mpsc::Sender<String>, mut commands: mpsc::Receiver<String>, link: &CommandLink) {
        loop {
            tracing::info!(port = %self.port, baud = self.baud, "opening serial port");
            let fault = match self.open() {
                Ok(mut port) => {
                    link.set_connected(true);
                    tracing::info!(port = %self.port, "serial port opened");
                    let fault = self.read_loop(port.as_mut(), tx, &mut commands);
                    link.set_connected(false);
                    fault
                }
                Err(e) => Some(e.to_string()),
            };

            let Some(fault) = fault else {
                // Receiver dropped
                return;
            };
            tracing::error!(port = %self.port, error = %fault, "serial error");
            if tx
                .blocking_send(format!("[ERROR] Serial error: {fault}"))
                .is_err()
            {
                return;
            }
            std::thread::sleep(REOPEN_BACKOFF);
        }
    }

    fn open(&self) -> serialport::Result<Box<dyn SerialPort>> {
        #[allow(unused_mut)]
        let mut builder = serialport::new(&self.port, self.baud).timeout(READ_TIMEOUT);
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        builder.open()
    }

    /// Read until a fault (returned) or until the receiver is dropped (`None`).
    fn read_loop(
        &self,
        port: &mut dyn SerialPort,
        tx: &mpsc::Sender<String>,
        commands: &mut mpsc::Receiver<String>,
    ) -> Option<String> {
        let mut lines = LineBuffer::default();
        let mut buf = [0u8; 1024];

        loop {
            while let Ok(command) = commands.try_recv() {
                if let Err(e) = port.write_all(command.as_bytes()).and_then(|_| port.flush()) {
                    return Some(e.to_string());
                }
                tracing::info!(command = command.trim_end(), "command written");
            }

            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    for line in lines.push(&buf[..n]) {
                        if tx.blocking_send(line).is_err() {
                            return None;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if tx.is_closed() {
                        return None;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Some(e.to_string()),
            }
        }
    }
}
