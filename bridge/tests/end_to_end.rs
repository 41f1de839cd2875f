//! Simulator-to-frame runs over loopback TCP with a recording output.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use bridge::{Bridge, BridgeConfig, BridgeError, OutputTransmitter, RecordingTransmitter};
use devices::magnetometer::{rs485, MagStatus, MessageType};
use devices::rate_sensor::{RateSensorPacket, RATE_SCALE};
use devices::reaction_wheel::HealthFrame;
use devices::EncodedFrame;

fn start(json: &str) -> (Bridge, Arc<RecordingTransmitter>) {
    let config = BridgeConfig::from_json(json).unwrap();
    let recorder = Arc::new(RecordingTransmitter::new());
    let shared = recorder.clone();
    let mut bridge = Bridge::with_transmitters(&config, move |_, _| {
        let tx: Arc<dyn OutputTransmitter> = shared.clone();
        Ok(tx)
    })
    .unwrap();
    bridge.start().unwrap();
    (bridge, recorder)
}

/// Open one connection per channel and send one little-endian value on each.
fn send_vector(bridge: &Bridge, device: &str, values: &[f64]) -> Vec<TcpStream> {
    let addrs = bridge.local_addrs(device);
    assert_eq!(addrs.len(), values.len());
    addrs
        .iter()
        .zip(values)
        .map(|(addr, value)| {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&value.to_le_bytes()).unwrap();
            stream
        })
        .collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Wait for a recorded frame of `device` satisfying `matches`.
fn wait_for_frame(
    recorder: &RecordingTransmitter,
    device: &str,
    mut matches: impl FnMut(&EncodedFrame) -> bool,
) -> Option<EncodedFrame> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if let Some(frame) = recorder.frames_for(device).into_iter().find(|f| matches(f)) {
            return Some(frame);
        }
        thread::sleep(Duration::from_millis(10));
    }
    None
}

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "devices": {{ "magnetometer": {{ "base_port": 0, "magnetometer": {{ "format": "rs485" }} }} }} }}"#
    )
    .unwrap();

    let config = BridgeConfig::load(file.path()).unwrap();
    assert_eq!(config.devices.len(), 1);
    assert!(config.devices["magnetometer"].enabled);

    let missing = file.path().with_extension("missing");
    assert!(matches!(BridgeConfig::load(&missing), Err(BridgeError::ConfigIo { .. })));
}

#[test]
fn test_reaction_wheel_end_to_end() {
    let (mut bridge, recorder) = start(
        r#"{ "devices": { "reaction_wheel": {
            "host": "127.0.0.1", "base_port": 0, "byte_order": "little",
            "read_timeout_ms": 100, "processing_interval_ms": 20
        } } }"#,
    );
    let _peers = send_vector(&bridge, "reaction_wheel", &[1000.0, 0.5, 25.0, 28.0]);

    let frame = wait_for_frame(&recorder, "reaction_wheel", |f| {
        HealthFrame::parse(f.bytes()).is_ok_and(|h| h.power_w == 14.0)
    })
    .expect("no complete health frame");
    let health = HealthFrame::parse(frame.bytes()).unwrap();
    assert_eq!(health.temperature_c, 25.0);
    assert_eq!(health.bus_voltage_v, 28.0);

    let vector = bridge.latest_vector("reaction_wheel").unwrap();
    assert_eq!(vector.values, vec![1000.0, 0.5, 25.0, 28.0]);
    let stats = bridge.processing_stats("reaction_wheel").unwrap();
    assert!(stats.frames_sent >= 1);
    assert_eq!(stats.encode_errors, 0);

    assert!(bridge.shutdown(Duration::from_secs(3)));
}

#[test]
fn test_magnetometer_forced_scenario() {
    let (mut bridge, recorder) = start(
        r#"{ "devices": { "magnetometer": {
            "host": "127.0.0.1", "base_port": 0, "byte_order": "little",
            "read_timeout_ms": 100, "processing_interval_ms": 20,
            "magnetometer": { "format": "rs485" },
            "scenarios": ["normal", "memory_error"],
            "cycling_enabled": true, "cycle_interval_s": 3600
        } } }"#,
    );
    assert!(bridge.force_scenario("magnetometer", "memory_error").unwrap());
    let _peers = send_vector(&bridge, "magnetometer", &[30_000.0, -20_000.0, 5_000.0]);

    let frame = wait_for_frame(&recorder, "magnetometer", |f| {
        rs485::parse_data(f.bytes()).is_ok_and(|d| d.field == [30_000, -20_000, 5_000])
    })
    .expect("no complete RS485 frame");
    let data = rs485::parse_data(frame.bytes()).unwrap();
    assert_eq!(data.status, MagStatus::MemoryError.code());
    assert_eq!(data.header.message_type, MessageType::Status as u8);
    assert_eq!(frame.len(), rs485::DATA_FRAME_LEN);

    assert!(bridge.shutdown(Duration::from_secs(3)));
}

#[test]
fn test_rate_sensor_with_synthesized_redundancy() {
    let (mut bridge, recorder) = start(
        r#"{ "devices": { "ars": {
            "host": "127.0.0.1", "base_port": 0, "byte_order": "little",
            "read_timeout_ms": 100, "processing_interval_ms": 20,
            "channel_count": 6,
            "rate_sensor": { "duplicate_to_redundant": true, "seed": 7 }
        } } }"#,
    );
    let rates = [0.01, 0.02, -0.03];
    let angles = [0.1, 0.2, 0.3];
    let mut values = rates.to_vec();
    values.extend_from_slice(&angles);
    let _peers = send_vector(&bridge, "ars", &values);

    let frame = wait_for_frame(&recorder, "ars", |f| {
        RateSensorPacket::parse(f.bytes())
            .is_ok_and(|p| p.rates.iter().all(|&r| r != 0) && p.angles.iter().all(|&a| a != 0))
    })
    .expect("no complete rate sensor frame");
    let packet = RateSensorPacket::parse(frame.bytes()).unwrap();
    for (decoded, sent) in packet.rates_rad_per_sec().iter().zip(rates) {
        assert_abs_diff_eq!(*decoded, sent, epsilon = RATE_SCALE);
    }
    assert_abs_diff_eq!(packet.angles_rad()[2], 0.3, epsilon = 1e-7);
    // Redundant channels within 0.1 % never trip fault detection
    assert!(!packet.word1().gyro_failed);

    assert!(bridge.shutdown(Duration::from_secs(3)));
}

/// True once at least three more frames of `device` have been sent.
fn frames_keep_coming(recorder: &RecordingTransmitter, device: &str) -> bool {
    let before = recorder.frames_for(device).len();
    wait_until(|| recorder.frames_for(device).len() >= before + 3)
}

fn last_health(recorder: &RecordingTransmitter) -> HealthFrame {
    let frames = recorder.frames_for("reaction_wheel");
    HealthFrame::parse(frames.last().unwrap().bytes()).unwrap()
}

#[test]
fn test_output_continues_under_bad_input_and_disconnect() {
    let (mut bridge, recorder) = start(
        r#"{ "devices": { "reaction_wheel": {
            "host": "127.0.0.1", "base_port": 0, "byte_order": "little",
            "read_timeout_ms": 100, "processing_interval_ms": 20
        } } }"#,
    );
    // Frames flow before the simulator connects, from zeroed channels
    assert!(frames_keep_coming(&recorder, "reaction_wheel"));
    assert_eq!(last_health(&recorder).power_w, 0.0);

    let mut peers = send_vector(&bridge, "reaction_wheel", &[1000.0, 0.5, 25.0, 28.0]);
    wait_for_frame(&recorder, "reaction_wheel", |f| {
        HealthFrame::parse(f.bytes()).is_ok_and(|h| h.power_w == 14.0)
    })
    .expect("no complete health frame");

    // Sustained NaN on every channel: counted, never published
    for _ in 0..20 {
        for peer in &mut peers {
            peer.write_all(&f64::NAN.to_le_bytes()).unwrap();
        }
    }
    let parse_errors = || bridge.quality_stats("reaction_wheel").unwrap().totals().parse_errors;
    assert!(wait_until(|| parse_errors() == 80));
    assert!(frames_keep_coming(&recorder, "reaction_wheel"));
    let health = last_health(&recorder);
    assert_eq!(health.power_w, 14.0);
    assert_eq!(health.temperature_c, 25.0);

    // Simulator gone: last-known values keep going out
    drop(peers);
    assert!(wait_until(|| bridge.quality_stats("reaction_wheel").unwrap().connected_channels() == 0));
    assert!(frames_keep_coming(&recorder, "reaction_wheel"));
    assert_eq!(last_health(&recorder).bus_voltage_v, 28.0);
    assert_eq!(bridge.latest_vector("reaction_wheel").unwrap().values, vec![1000.0, 0.5, 25.0, 28.0]);

    let stats = bridge.processing_stats("reaction_wheel").unwrap();
    assert_eq!(stats.encode_errors, 0);
    assert!(bridge.shutdown(Duration::from_secs(3)));
}
