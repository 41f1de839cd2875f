//! Per-device processing loops and the bridge facade.
//!
//! For every enabled device the bridge owns a set of ingestion listeners, an
//! encoder, a scenario source and a transmitter. A processing thread per
//! device copies the latest vector out of the ingestion state, takes a
//! scenario snapshot and encodes outside the ingestion lock.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use devices::magnetometer::{MagnetometerEncoder, MagnetometerStatus};
use devices::rate_sensor::{RateSensorEncoder, RateSensorStatus};
use devices::reaction_wheel::{ReactionWheelEncoder, ReactionWheelStatus};
use devices::{DeviceEncoder, EncodedFrame, ScenarioCycler, ScenarioParams};
use ingest::endianness::EndiannessVerdict;
use ingest::{DeviceQuality, DeviceState, IngestError, IngestionManager, LatestDeviceVector};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, DeviceConfig, DeviceKind};
use crate::error::{BridgeError, BridgeResult};
use crate::transmitter::{build_transmitter, OutputTransmitter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scenario parameters for one device type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusSnapshot {
    RateSensor(RateSensorStatus),
    Magnetometer(MagnetometerStatus),
    ReactionWheel(ReactionWheelStatus),
}

impl StatusSnapshot {
    pub fn kind(&self) -> DeviceKind {
        match self {
            StatusSnapshot::RateSensor(_) => DeviceKind::RateSensor,
            StatusSnapshot::Magnetometer(_) => DeviceKind::Magnetometer,
            StatusSnapshot::ReactionWheel(_) => DeviceKind::ReactionWheel,
        }
    }

    /// Named preset for a device type; unknown names give "normal".
    pub fn resolve(kind: DeviceKind, name: &str) -> Self {
        match kind {
            DeviceKind::RateSensor => StatusSnapshot::RateSensor(RateSensorStatus::resolve(name)),
            DeviceKind::Magnetometer => StatusSnapshot::Magnetometer(MagnetometerStatus::resolve(name)),
            DeviceKind::ReactionWheel => StatusSnapshot::ReactionWheel(ReactionWheelStatus::resolve(name)),
        }
    }

    pub fn normal(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::RateSensor => StatusSnapshot::RateSensor(RateSensorStatus::normal()),
            DeviceKind::Magnetometer => StatusSnapshot::Magnetometer(MagnetometerStatus::normal()),
            DeviceKind::ReactionWheel => StatusSnapshot::ReactionWheel(ReactionWheelStatus::normal()),
        }
    }
}

/// Encoder of any supported device.
pub enum AnyEncoder {
    RateSensor(RateSensorEncoder),
    Magnetometer(MagnetometerEncoder),
    ReactionWheel(ReactionWheelEncoder),
}

impl AnyEncoder {
    pub fn new(kind: DeviceKind, config: &DeviceConfig) -> Self {
        match kind {
            DeviceKind::RateSensor => AnyEncoder::RateSensor(RateSensorEncoder::new(config.rate_sensor.clone())),
            DeviceKind::Magnetometer => {
                AnyEncoder::Magnetometer(MagnetometerEncoder::new(config.magnetometer.clone()))
            }
            DeviceKind::ReactionWheel => {
                AnyEncoder::ReactionWheel(ReactionWheelEncoder::new(config.reaction_wheel.clone()))
            }
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            AnyEncoder::RateSensor(_) => DeviceKind::RateSensor,
            AnyEncoder::Magnetometer(_) => DeviceKind::Magnetometer,
            AnyEncoder::ReactionWheel(_) => DeviceKind::ReactionWheel,
        }
    }

    fn mismatch(device: DeviceKind, snapshot: &StatusSnapshot) -> BridgeError {
        BridgeError::SnapshotMismatch {
            device,
            snapshot: snapshot.kind(),
        }
    }

    /// Encode a single frame.
    pub fn encode(&mut self, values: &[f64], snapshot: &StatusSnapshot) -> BridgeResult<EncodedFrame> {
        let kind = self.kind();
        let frame = match (self, snapshot) {
            (AnyEncoder::RateSensor(enc), StatusSnapshot::RateSensor(status)) => enc.encode(values, status)?,
            (AnyEncoder::Magnetometer(enc), StatusSnapshot::Magnetometer(status)) => enc.encode(values, status)?,
            (AnyEncoder::ReactionWheel(enc), StatusSnapshot::ReactionWheel(status)) => enc.encode(values, status)?,
            _ => return Err(Self::mismatch(kind, snapshot)),
        };
        Ok(frame)
    }

    /// Encode every frame due this cycle.
    pub fn encode_burst(&mut self, values: &[f64], snapshot: &StatusSnapshot) -> BridgeResult<Vec<EncodedFrame>> {
        let kind = self.kind();
        let frames = match (self, snapshot) {
            (AnyEncoder::RateSensor(enc), StatusSnapshot::RateSensor(status)) => enc.encode_burst(values, status)?,
            (AnyEncoder::Magnetometer(enc), StatusSnapshot::Magnetometer(status)) => {
                enc.encode_burst(values, status)?
            }
            (AnyEncoder::ReactionWheel(enc), StatusSnapshot::ReactionWheel(status)) => {
                enc.encode_burst(values, status)?
            }
            _ => return Err(Self::mismatch(kind, snapshot)),
        };
        Ok(frames)
    }
}

/// Scenario source of any supported device.
pub enum AnyScenario {
    RateSensor(ScenarioCycler<RateSensorStatus>),
    Magnetometer(ScenarioCycler<MagnetometerStatus>),
    ReactionWheel(ScenarioCycler<ReactionWheelStatus>),
}

impl AnyScenario {
    pub fn new(kind: DeviceKind, names: Vec<String>, interval: Duration, enabled: bool) -> Self {
        match kind {
            DeviceKind::RateSensor => AnyScenario::RateSensor(ScenarioCycler::new(names, interval, enabled)),
            DeviceKind::Magnetometer => AnyScenario::Magnetometer(ScenarioCycler::new(names, interval, enabled)),
            DeviceKind::ReactionWheel => AnyScenario::ReactionWheel(ScenarioCycler::new(names, interval, enabled)),
        }
    }

    pub fn from_config(kind: DeviceKind, config: &DeviceConfig) -> Self {
        Self::new(kind, config.scenarios.clone(), config.cycle_interval(), config.cycling_enabled)
    }

    /// Current parameters, advancing the rotation if due.
    pub fn snapshot(&mut self) -> StatusSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> StatusSnapshot {
        match self {
            AnyScenario::RateSensor(c) => StatusSnapshot::RateSensor(c.snapshot_at(now)),
            AnyScenario::Magnetometer(c) => StatusSnapshot::Magnetometer(c.snapshot_at(now)),
            AnyScenario::ReactionWheel(c) => StatusSnapshot::ReactionWheel(c.snapshot_at(now)),
        }
    }

    pub fn force(&mut self, name: &str) -> bool {
        match self {
            AnyScenario::RateSensor(c) => c.force(name),
            AnyScenario::Magnetometer(c) => c.force(name),
            AnyScenario::ReactionWheel(c) => c.force(name),
        }
    }

    pub fn current_name(&self) -> String {
        match self {
            AnyScenario::RateSensor(c) => c.current_name().to_string(),
            AnyScenario::Magnetometer(c) => c.current_name().to_string(),
            AnyScenario::ReactionWheel(c) => c.current_name().to_string(),
        }
    }
}

/// Counters kept by a processing loop.
#[derive(Debug, Default)]
struct ProcessingCounters {
    cycles: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    encode_errors: AtomicU64,
}

/// Snapshot of a processing loop's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Encode cycles that succeeded
    pub cycles: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub encode_errors: u64,
}

impl ProcessingCounters {
    fn snapshot(&self) -> ProcessingStats {
        ProcessingStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}

struct BridgeDevice {
    kind: DeviceKind,
    config: DeviceConfig,
    encoder: Arc<Mutex<AnyEncoder>>,
    scenario: Arc<Mutex<AnyScenario>>,
    transmitter: Arc<dyn OutputTransmitter>,
    counters: Arc<ProcessingCounters>,
}

/// Everything one processing thread touches.
struct ProcessingLoop {
    name: String,
    interval: Duration,
    state: Arc<DeviceState>,
    encoder: Arc<Mutex<AnyEncoder>>,
    scenario: Arc<Mutex<AnyScenario>>,
    transmitter: Arc<dyn OutputTransmitter>,
    counters: Arc<ProcessingCounters>,
    shutdown: Arc<AtomicBool>,
}

impl ProcessingLoop {
    /// Encode and send once per interval, with fresh data or not.
    ///
    /// Channels keep their last accepted value, and read as zero until the
    /// first one arrives, so output continues while the simulator is gone.
    fn run(self) {
        let mut last_total = 0u64;
        let mut stale = false;
        while !self.shutdown.load(Ordering::SeqCst) {
            let tick = Instant::now();
            let vector = self.state.latest_vector();
            let total = vector.total_samples();
            if total != last_total {
                last_total = total;
                stale = false;
            } else if !stale {
                stale = true;
                debug!("{}: no new samples, repeating last-known values", self.name);
            }
            self.process(&vector);
            self.sleep_until(tick + self.interval);
        }
        debug!("{} processing loop stopped", self.name);
    }

    fn process(&self, vector: &LatestDeviceVector) {
        let snapshot = lock(&self.scenario).snapshot();
        let encoded = lock(&self.encoder).encode_burst(&vector.values, &snapshot);
        match encoded {
            Ok(frames) => {
                self.counters.cycles.fetch_add(1, Ordering::Relaxed);
                for frame in &frames {
                    if self.transmitter.send(&self.name, frame) {
                        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => {
                let count = self.counters.encode_errors.fetch_add(1, Ordering::Relaxed) + 1;
                error!("{}: encoding failed ({count} total): {e}", self.name);
            }
        }
    }

    fn sleep_until(&self, deadline: Instant) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(20)));
        }
    }
}

/// The running bridge: ingestion, encoders, scenario sources, outputs.
pub struct Bridge {
    manager: IngestionManager,
    devices: BTreeMap<String, BridgeDevice>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Build a bridge with the outputs named in the configuration.
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        Self::with_transmitters(config, |name, device| build_transmitter(name, &device.output))
    }

    /// Build a bridge whose outputs come from `make_transmitter`.
    pub fn with_transmitters<F>(config: &BridgeConfig, mut make_transmitter: F) -> BridgeResult<Self>
    where
        F: FnMut(&str, &DeviceConfig) -> BridgeResult<Arc<dyn OutputTransmitter>>,
    {
        config.validate()?;
        let mut manager = IngestionManager::new();
        let mut devices = BTreeMap::new();

        for (name, kind, device) in config.enabled_devices() {
            manager.add_device(device.ingest_config(name, kind))?;
            let transmitter = make_transmitter(name, device)?;
            info!(
                "{name}: {} channel(s), {} mode, output {}",
                device.channel_count_for(kind),
                device.tcp_mode,
                transmitter.describe()
            );
            devices.insert(
                name.to_string(),
                BridgeDevice {
                    kind,
                    config: device.clone(),
                    encoder: Arc::new(Mutex::new(AnyEncoder::new(kind, device))),
                    scenario: Arc::new(Mutex::new(AnyScenario::from_config(kind, device))),
                    transmitter,
                    counters: Arc::default(),
                },
            );
        }
        if devices.is_empty() {
            warn!("No devices enabled");
        }

        Ok(Self {
            manager,
            devices,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        })
    }

    /// Start ingestion and the processing loops.
    pub fn start(&mut self) -> BridgeResult<()> {
        self.manager.start()?;
        self.shutdown.store(false, Ordering::SeqCst);
        for (name, device) in &self.devices {
            let state = self
                .manager
                .device_state(name)
                .ok_or_else(|| BridgeError::UnknownDevice(name.clone()))?;
            let worker = ProcessingLoop {
                name: name.clone(),
                interval: device.config.processing_interval(),
                state,
                encoder: device.encoder.clone(),
                scenario: device.scenario.clone(),
                transmitter: device.transmitter.clone(),
                counters: device.counters.clone(),
                shutdown: self.shutdown.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("{name}-encode"))
                .spawn(move || worker.run())
                .map_err(IngestError::from)?;
            self.workers.push(handle);
        }
        info!("Bridge started with {} device(s)", self.devices.len());
        Ok(())
    }

    fn device(&self, name: &str) -> BridgeResult<&BridgeDevice> {
        self.devices
            .get(name)
            .ok_or_else(|| BridgeError::UnknownDevice(name.to_string()))
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn device_kind(&self, device: &str) -> BridgeResult<DeviceKind> {
        Ok(self.device(device)?.kind)
    }

    /// Latest value of every channel of a device.
    pub fn latest_vector(&self, device: &str) -> BridgeResult<LatestDeviceVector> {
        self.manager
            .latest_vector(device)
            .ok_or_else(|| BridgeError::UnknownDevice(device.to_string()))
    }

    /// Per-channel ingestion quality of a device.
    pub fn quality_stats(&self, device: &str) -> BridgeResult<DeviceQuality> {
        self.manager
            .quality_stats(device)
            .ok_or_else(|| BridgeError::UnknownDevice(device.to_string()))
    }

    pub fn endianness_report(&self, device: &str) -> BridgeResult<BTreeMap<usize, EndiannessVerdict>> {
        self.manager
            .endianness_report(device)
            .ok_or_else(|| BridgeError::UnknownDevice(device.to_string()))
    }

    pub fn processing_stats(&self, device: &str) -> BridgeResult<ProcessingStats> {
        Ok(self.device(device)?.counters.snapshot())
    }

    /// Server-mode listening addresses of a device, by channel.
    pub fn local_addrs(&self, device: &str) -> Vec<SocketAddr> {
        self.manager.local_addrs(device)
    }

    /// Encode a vector with a device's encoder, outside the processing loop.
    ///
    /// Shares encoder state (counters, sequence numbers) with the loop.
    pub fn encode(&self, device: &str, vector: &[f64], snapshot: &StatusSnapshot) -> BridgeResult<EncodedFrame> {
        lock(&self.device(device)?.encoder).encode(vector, snapshot)
    }

    /// Current scenario parameters of a device, advancing the rotation if due.
    pub fn status_snapshot(&self, device: &str) -> BridgeResult<StatusSnapshot> {
        Ok(lock(&self.device(device)?.scenario).snapshot())
    }

    pub fn current_scenario(&self, device: &str) -> BridgeResult<String> {
        Ok(lock(&self.device(device)?.scenario).current_name())
    }

    /// Jump a device to a listed scenario.
    pub fn force_scenario(&self, device: &str, name: &str) -> BridgeResult<bool> {
        Ok(lock(&self.device(device)?.scenario).force(name))
    }

    /// Log one line per device with ingestion and output health.
    pub fn log_status(&self) {
        for name in self.devices.keys() {
            let (Ok(quality), Ok(stats), Ok(scenario)) = (
                self.quality_stats(name),
                self.processing_stats(name),
                self.current_scenario(name),
            ) else {
                continue;
            };
            let totals = quality.totals();
            info!(
                "{name}: {}/{} connected, {} valid / {} received ({:.1}%), {} timing, {} size, {} parse, {} conn errors; {} frames sent, {} send failures; scenario '{scenario}'",
                quality.connected_channels(),
                quality.channels.len(),
                totals.valid,
                totals.received,
                totals.quality_score() * 100.0,
                totals.timing_violations,
                totals.size_violations,
                totals.parse_errors,
                totals.connection_errors,
                stats.frames_sent,
                stats.send_failures,
            );
            for channel in &quality.channels {
                if let Some(verdict) = &channel.endianness {
                    info!(
                        "{name} channel {}: {} endian ({:.2}, {}, {} samples)",
                        channel.channel,
                        verdict.byte_order,
                        verdict.confidence,
                        verdict.method,
                        verdict.samples_tested
                    );
                }
            }
        }
    }

    /// Stop the processing loops and ingestion within `timeout`.
    ///
    /// Returns `true` if every thread exited in time.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        let mut clean = self.manager.shutdown(timeout);

        while self.workers.iter().any(|w| !w.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        for worker in self.workers.drain(..) {
            if worker.is_finished() {
                if worker.join().is_err() {
                    error!("Processing thread panicked");
                    clean = false;
                }
            } else {
                warn!("Processing thread did not stop within {timeout:?}");
                clean = false;
            }
        }
        info!("Bridge stopped");
        clean
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown(Duration::from_secs(3));
        }
    }
}
