//! Output links for encoded frames.
//!
//! Transmitters are deliberately thin: no queueing, no retry beyond
//! reopening a broken TCP connection on the next frame. A failed send is
//! reported through the return value and counted by the caller.

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use devices::EncodedFrame;
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::config::{OutputConfig, OutputMode};
use crate::error::{BridgeError, BridgeResult};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sink for encoded frames.
pub trait OutputTransmitter: Send + Sync {
    /// Send one frame; `false` when it could not be delivered.
    fn send(&self, device: &str, frame: &EncodedFrame) -> bool;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// TCP client that reconnects on the next send after a failure.
pub struct TcpTransmitter {
    address: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransmitter {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            address: format!("{host}:{port}"),
            timeout,
            stream: Mutex::new(None),
        }
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        use std::net::ToSocketAddrs;
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "address did not resolve"))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        info!("Output connected to {}", self.address);
        Ok(stream)
    }
}

impl OutputTransmitter for TcpTransmitter {
    fn send(&self, device: &str, frame: &EncodedFrame) -> bool {
        let mut slot = lock(&self.stream);
        if slot.is_none() {
            match self.connect() {
                Ok(stream) => *slot = Some(stream),
                Err(e) => {
                    debug!("{device}: cannot connect to {}: {e}", self.address);
                    return false;
                }
            }
        }
        let Some(stream) = slot.as_mut() else {
            return false;
        };
        match stream.write_all(frame.bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!("{device}: send to {} failed: {e}", self.address);
                *slot = None;
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Serial (RS232/RS485) output.
pub struct SerialTransmitter {
    path: String,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SerialTransmitter {
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened serial output {path} at {baud_rate} baud");
        Ok(Self {
            path: path.to_string(),
            port: Mutex::new(port),
        })
    }
}

impl OutputTransmitter for SerialTransmitter {
    fn send(&self, device: &str, frame: &EncodedFrame) -> bool {
        let mut port = lock(&self.port);
        match port.write_all(frame.bytes()).and_then(|_| port.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("{device}: write to {} failed: {e}", self.path);
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("serial://{}", self.path)
    }
}

/// Logs every frame as hex. Also stands in for CAN output.
#[derive(Debug, Default)]
pub struct LogTransmitter;

impl OutputTransmitter for LogTransmitter {
    fn send(&self, device: &str, frame: &EncodedFrame) -> bool {
        info!("{device} -> {frame}");
        true
    }

    fn describe(&self) -> String {
        "log".to_string()
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingTransmitter {
    frames: Mutex<Vec<(String, EncodedFrame)>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far, with the device name.
    pub fn frames(&self) -> Vec<(String, EncodedFrame)> {
        lock(&self.frames).clone()
    }

    /// Frames sent by one device.
    pub fn frames_for(&self, device: &str) -> Vec<EncodedFrame> {
        lock(&self.frames)
            .iter()
            .filter(|(name, _)| name == device)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.frames).clear();
    }
}

impl OutputTransmitter for RecordingTransmitter {
    fn send(&self, device: &str, frame: &EncodedFrame) -> bool {
        lock(&self.frames).push((device.to_string(), frame.clone()));
        true
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Build the transmitter an output configuration asks for.
pub fn build_transmitter(device: &str, output: &OutputConfig) -> BridgeResult<Arc<dyn OutputTransmitter>> {
    let transmitter: Arc<dyn OutputTransmitter> = match output.mode {
        OutputMode::Log => Arc::new(LogTransmitter),
        OutputMode::Can => {
            info!("{device}: CAN output is logged with frame identifiers");
            Arc::new(LogTransmitter)
        }
        OutputMode::Tcp => Arc::new(TcpTransmitter::new(&output.host, output.port, output.timeout())),
        OutputMode::Serial => Arc::new(
            SerialTransmitter::open(&output.serial_port, output.baud_rate, output.timeout()).map_err(|e| {
                BridgeError::Output {
                    device: device.to_string(),
                    reason: e.to_string(),
                }
            })?,
        ),
    };
    Ok(transmitter)
}
