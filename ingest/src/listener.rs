//! One TCP channel: accept (or connect), read, reassemble, publish.
//!
//! Each listener runs on its own OS thread. In server mode the listening
//! socket is non-blocking and polled, so the thread notices shutdown even
//! when no simulator ever connects; the peer socket uses a bounded read
//! timeout for the same reason. Only one peer is served at a time; further
//! connections are accepted and closed immediately.

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::config::{ByteOrderMode, DeviceIngestConfig, TcpMode, TimingPolicy};
use crate::device_state::{DeviceState, FrameOutcome};
use crate::endianness::{ByteOrder, EndiannessDetector};
use crate::error::{IngestError, IngestResult};
use crate::frame_reader::{FloatFrameReader, SAMPLE_LEN};
use crate::lock;

/// How often an idle server polls for connections and shutdown.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

const READ_BUFFER_LEN: usize = 4096;

type ActivePeer = Arc<Mutex<Option<TcpStream>>>;

/// Everything the channel thread needs.
struct ChannelWorker {
    name: String,
    channel: usize,
    byte_order: ByteOrderMode,
    timing: TimingPolicy,
    read_timeout: Duration,
    reconnect_delay: Duration,
    device: Arc<DeviceState>,
    detector: Arc<EndiannessDetector>,
    shutdown: Arc<AtomicBool>,
    active_peer: ActivePeer,
}

/// Handle to a running channel thread.
pub struct ChannelListener {
    name: String,
    channel: usize,
    local_addr: Option<SocketAddr>,
    active_peer: ActivePeer,
    handle: Option<JoinHandle<()>>,
}

impl ChannelListener {
    /// Bind (server) or resolve (client) and start the channel thread.
    ///
    /// Binding happens before this returns, so a port conflict is reported
    /// to the caller rather than logged from the thread.
    pub fn spawn(
        config: &DeviceIngestConfig,
        channel: usize,
        device: Arc<DeviceState>,
        detector: Arc<EndiannessDetector>,
        shutdown: Arc<AtomicBool>,
    ) -> IngestResult<Self> {
        let active_peer: ActivePeer = Arc::new(Mutex::new(None));
        let worker = ChannelWorker {
            name: config.name.clone(),
            channel,
            byte_order: config.byte_order,
            timing: config.timing,
            read_timeout: config.read_timeout,
            reconnect_delay: config.reconnect_delay,
            device,
            detector,
            shutdown,
            active_peer: active_peer.clone(),
        };
        let address = config.address_for(channel);
        let thread_name = format!("{}-ch{channel}", config.name);

        let (local_addr, handle) = match config.mode {
            TcpMode::Server => {
                let bind_error = |source| IngestError::Bind {
                    device: config.name.clone(),
                    channel,
                    addr: address.clone(),
                    source,
                };
                let listener = TcpListener::bind(&address).map_err(bind_error)?;
                listener.set_nonblocking(true)?;
                let local = listener.local_addr()?;
                worker.device.set_port(channel, local.port());
                info!("{} channel {channel} listening on {local}", config.name);
                let handle = thread::Builder::new()
                    .name(thread_name)
                    .spawn(move || worker.run_server(listener))?;
                (Some(local), handle)
            }
            TcpMode::Client => {
                let remote = address
                    .to_socket_addrs()
                    .map_err(|_| IngestError::Resolve(address.clone()))?
                    .next()
                    .ok_or_else(|| IngestError::Resolve(address.clone()))?;
                worker.device.set_port(channel, remote.port());
                let handle = thread::Builder::new()
                    .name(thread_name)
                    .spawn(move || worker.run_client(remote))?;
                (None, handle)
            }
        };

        Ok(Self {
            name: config.name.clone(),
            channel,
            local_addr,
            active_peer,
            handle: Some(handle),
        })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Bound address in server mode.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Force-close the active peer so a blocked read returns.
    pub fn close_peer(&self) {
        if let Some(stream) = lock(&self.active_peer).as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} channel {} thread panicked", self.name, self.channel);
            }
        }
    }
}

impl ChannelWorker {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep in short steps so shutdown is not delayed.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_shutdown() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(ACCEPT_POLL));
        }
    }

    fn run_server(self, listener: TcpListener) {
        while !self.is_shutdown() {
            match listener.accept() {
                Ok((stream, peer)) => self.serve(stream, peer, Some(&listener)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    error!("{} channel {}: accept failed: {e}", self.name, self.channel);
                    self.device.record_connection_error(self.channel);
                    self.pause(self.reconnect_delay.min(Duration::from_secs(1)));
                }
            }
        }
        debug!("{} channel {} listener stopped", self.name, self.channel);
    }

    fn run_client(self, remote: SocketAddr) {
        while !self.is_shutdown() {
            match TcpStream::connect_timeout(&remote, self.read_timeout) {
                Ok(stream) => self.serve(stream, remote, None),
                Err(e) => {
                    debug!("{} channel {}: connect to {remote} failed: {e}", self.name, self.channel);
                    self.device.record_connection_error(self.channel);
                }
            }
            self.pause(self.reconnect_delay);
        }
        debug!("{} channel {} client stopped", self.name, self.channel);
    }

    /// Read from one peer until it disconnects or shutdown is requested.
    fn serve(&self, stream: TcpStream, peer: SocketAddr, listener: Option<&TcpListener>) {
        let configured = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_read_timeout(Some(self.read_timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .and_then(|_| stream.try_clone());
        let registered = match configured {
            Ok(clone) => clone,
            Err(e) => {
                error!("{} channel {}: cannot configure {peer}: {e}", self.name, self.channel);
                self.device.record_connection_error(self.channel);
                return;
            }
        };
        *lock(&self.active_peer) = Some(registered);
        self.device.set_connected(self.channel, true);
        info!("{} channel {} connected to {peer}", self.name, self.channel);

        let mut stream = stream;
        let mut reader = FloatFrameReader::new();
        let mut buf = [0u8; READ_BUFFER_LEN];

        while !self.is_shutdown() {
            if let Some(listener) = listener {
                self.reject_pending(listener);
            }
            match stream.read(&mut buf) {
                Ok(0) => {
                    info!("{} channel {}: {peer} disconnected", self.name, self.channel);
                    break;
                }
                Ok(n) => {
                    reader.push(&buf[..n]);
                    for frame in reader.drain() {
                        self.process(frame);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    if !self.is_shutdown() {
                        error!("{} channel {}: read from {peer} failed: {e}", self.name, self.channel);
                        self.device.record_connection_error(self.channel);
                    }
                    break;
                }
            }
        }

        if let Some(partial) = reader.take_partial() {
            debug!(
                "{} channel {}: {} trailing bytes at disconnect",
                self.name,
                self.channel,
                partial.len()
            );
            self.process(partial);
        }
        lock(&self.active_peer).take();
        self.device.set_connected(self.channel, false);
    }

    /// Accept and drop every connection waiting behind the active peer.
    fn reject_pending(&self, listener: &TcpListener) {
        while let Ok((extra, addr)) = listener.accept() {
            warn!(
                "{} channel {}: rejecting {addr}, a peer is already connected",
                self.name, self.channel
            );
            self.device.record_rejected_peer(self.channel);
            let _ = extra.shutdown(Shutdown::Both);
        }
    }

    fn decode(&self, raw: [u8; SAMPLE_LEN]) -> f64 {
        match self.byte_order {
            ByteOrderMode::Auto => self.detector.observe_and_decode(self.channel, raw),
            ByteOrderMode::Little => ByteOrder::Little.decode(raw),
            ByteOrderMode::Big => ByteOrder::Big.decode(raw),
        }
    }

    fn process(&self, frame: Bytes) {
        let now = Instant::now();
        let outcome = match <[u8; SAMPLE_LEN]>::try_from(frame.as_ref()) {
            Err(_) => FrameOutcome::SizeViolation,
            Ok(raw) => {
                let value = self.decode(raw);
                if value.is_finite() {
                    FrameOutcome::Value(value)
                } else {
                    debug!("{} channel {}: non-finite sample {value}", self.name, self.channel);
                    FrameOutcome::ParseError
                }
            }
        };
        if let Some(elapsed) = self.device.record_frame(self.channel, outcome, now, &self.timing) {
            debug!(
                "{} channel {}: timing violation, {:.1} ms since previous sample",
                self.name,
                self.channel,
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}
