//! Owner of every device's listeners and the query API.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::DeviceIngestConfig;
use crate::device_state::{DeviceState, LatestDeviceVector};
use crate::endianness::{EndiannessDetector, EndiannessVerdict};
use crate::error::{IngestError, IngestResult};
use crate::listener::ChannelListener;
use crate::quality::DeviceQuality;

/// Default bound on how long [`IngestionManager::shutdown`] waits.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

struct DeviceHandle {
    config: DeviceIngestConfig,
    state: Arc<DeviceState>,
    detector: Arc<EndiannessDetector>,
    listeners: Vec<ChannelListener>,
}

/// Runs N channel listeners per registered device.
///
/// ```no_run
/// use ingest::{DeviceIngestConfig, IngestionManager};
///
/// let mut manager = IngestionManager::new();
/// manager.add_device(DeviceIngestConfig::new("reaction_wheel", 4, 50050)).unwrap();
/// manager.start().unwrap();
/// let vector = manager.latest_vector("reaction_wheel");
/// ```
pub struct IngestionManager {
    devices: BTreeMap<String, DeviceHandle>,
    shutdown: Arc<AtomicBool>,
}

impl Default for IngestionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionManager {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a device. Listeners start with [`start`](Self::start).
    pub fn add_device(&mut self, config: DeviceIngestConfig) -> IngestResult<()> {
        config.validate()?;
        if self.devices.contains_key(&config.name) {
            return Err(IngestError::DuplicateDevice(config.name));
        }
        let state = Arc::new(DeviceState::new(config.name.clone(), config.channel_count));
        let detector = Arc::new(EndiannessDetector::new(config.detector.clone()));
        self.devices.insert(
            config.name.clone(),
            DeviceHandle {
                config,
                state,
                detector,
                listeners: Vec::new(),
            },
        );
        Ok(())
    }

    /// Spawn the listeners of every registered device not yet running.
    ///
    /// On a bind failure the listeners already started keep running; call
    /// [`shutdown`](Self::shutdown) to stop them.
    pub fn start(&mut self) -> IngestResult<()> {
        self.shutdown.store(false, Ordering::SeqCst);
        for handle in self.devices.values_mut() {
            if !handle.listeners.is_empty() {
                continue;
            }
            for channel in 0..handle.config.channel_count {
                let listener = ChannelListener::spawn(
                    &handle.config,
                    channel,
                    handle.state.clone(),
                    handle.detector.clone(),
                    self.shutdown.clone(),
                )?;
                handle.listeners.push(listener);
            }
            info!(
                "Started {} {} listener(s) for {}",
                handle.config.channel_count, handle.config.mode, handle.config.name
            );
        }
        Ok(())
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.devices
            .values()
            .any(|h| h.listeners.iter().any(|l| !l.is_finished()))
    }

    /// Shared state of a device, for consumers that poll it directly.
    pub fn device_state(&self, device: &str) -> Option<Arc<DeviceState>> {
        self.devices.get(device).map(|h| h.state.clone())
    }

    /// Latest value of every channel of a device.
    pub fn latest_vector(&self, device: &str) -> Option<LatestDeviceVector> {
        self.devices.get(device).map(|h| h.state.latest_vector())
    }

    /// Per-channel quality counters, timing and byte-order verdicts.
    pub fn quality_stats(&self, device: &str) -> Option<DeviceQuality> {
        self.devices
            .get(device)
            .map(|h| h.state.quality(&h.detector.report()))
    }

    /// Byte-order verdicts per channel.
    pub fn endianness_report(&self, device: &str) -> Option<BTreeMap<usize, EndiannessVerdict>> {
        self.devices.get(device).map(|h| h.detector.report())
    }

    /// Bound addresses of a device's server-mode listeners, by channel.
    pub fn local_addrs(&self, device: &str) -> Vec<SocketAddr> {
        self.devices
            .get(device)
            .map(|h| h.listeners.iter().filter_map(|l| l.local_addr()).collect())
            .unwrap_or_default()
    }

    /// Stop every listener, waiting at most `timeout` for their threads.
    ///
    /// Returns `true` when all threads exited in time. Threads still running
    /// after the timeout are detached.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.devices.values() {
            for listener in &handle.listeners {
                listener.close_peer();
            }
        }

        let deadline = Instant::now() + timeout;
        while self.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let mut clean = true;
        for handle in self.devices.values_mut() {
            for mut listener in handle.listeners.drain(..) {
                if listener.is_finished() {
                    listener.join();
                } else {
                    warn!(
                        "{} channel {} did not stop within {timeout:?}",
                        handle.config.name,
                        listener.channel()
                    );
                    clean = false;
                }
            }
        }
        clean
    }
}

impl Drop for IngestionManager {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}
