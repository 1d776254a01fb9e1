//! Session tests against an emulated device.
//!
//! Covers:
//! - Connect, identity and firmware checks
//! - Chunked load with whole-sequence retry
//! - Single-pass save and acknowledgment
//! - Auxiliary commands (ADC, resets)
//! - Channel loss

mod common;

use common::*;
use gemsync::chunked::TransferMode;
use gemsync::error::{Error, ProtocolError, TransportError};
use gemsync::protocol::Command;
use gemsync::record::{SettingsRecord, Value};
use gemsync::session::{ProtocolConfig, Session};
use gemsync::types::{ConnectionState, FirmwareDate, HardwareRevision};

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_reports_identity() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let session = Session::connect(transport, protocol_config()).await.unwrap();

    let info = session.info();
    assert_eq!(info.port, "Gemini");
    assert_eq!(info.firmware.raw, FIRMWARE);
    assert_eq!(info.firmware.date, Some(FirmwareDate::new(2022, 3, 14)));
    assert_eq!(info.serial.as_str(), "101112131415161718191a1b1c1d1e1f");
    assert_eq!(info.revision, HardwareRevision(5));
    assert_eq!(session.state(), ConnectionState::Connected);

    // Only the identity exchanges happen during connect.
    assert_eq!(
        device.state.lock().requests,
        vec![Command::Hello, Command::GetSerialNumber]
    );
}

#[tokio::test]
async fn test_connect_defaults_revision() {
    let mut state = DeviceState::new(v2());
    state.serial.truncate(16);
    let (_device, transport) = MockDevice::spawn(state);

    let session = Session::connect(transport, protocol_config()).await.unwrap();
    assert_eq!(session.info().revision, HardwareRevision(4));
}

#[tokio::test]
async fn test_incompatible_firmware() {
    for firmware in ["2021.05.31", "not a version"] {
        let mut state = DeviceState::new(v2());
        state.firmware = firmware.into();
        let (device, transport) = MockDevice::spawn(state);

        let result = Session::connect(transport, protocol_config()).await;
        match result {
            Err(Error::IncompatibleFirmware { version, minimum }) => {
                assert_eq!(version, firmware);
                assert_eq!(minimum, "2021.06.01");
            }
            other => panic!("expected IncompatibleFirmware, got {other:?}"),
        }

        // No settings exchange was attempted, and the host hung up.
        assert!(device.state.lock().load_indices.is_empty());
        let state = std::sync::Arc::clone(&device.state);
        assert!(device.closed().await);
        assert_eq!(
            state.lock().requests,
            vec![Command::Hello, Command::GetSerialNumber]
        );
    }
}

#[tokio::test]
async fn test_minimum_firmware_is_configurable() {
    let (_device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let config = ProtocolConfig {
        minimum_firmware: FirmwareDate::new(2023, 1, 1),
        ..protocol_config()
    };
    let result = Session::connect(transport, config).await;
    assert!(matches!(result, Err(Error::IncompatibleFirmware { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_fatal() {
    let mut state = DeviceState::new(v2());
    state.mute = true;
    let (device, transport) = MockDevice::spawn(state);

    let result = Session::connect(transport, protocol_config()).await;
    assert!(matches!(result, Err(Error::Timeout { command: 0x01, .. })));
    // No retry of the hello.
    assert_eq!(device.state.lock().requests, vec![Command::Hello]);
}

// ============================================================================
// Load
// ============================================================================

#[tokio::test]
async fn test_load_settings() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));
    assert_eq!(record.get("adc_gain_corr"), Some(Value::Int(2051)));

    // The shared handle sees the loaded values.
    let handle = session.settings();
    assert_eq!(*handle.read(), record);

    // 75 bytes encode to 94: five chunks of 20, the last one 14.
    assert_eq!(device.state.lock().load_indices, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_load_retries_from_first_chunk() {
    let state = DeviceState::new(v2()).with_faults([
        Fault::new(2, FaultKind::ShortChunk),
        Fault::new(2, FaultKind::ShortChunk),
        Fault::new(2, FaultKind::ShortChunk),
    ]);
    let (device, transport) = MockDevice::spawn(state);
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));

    // Three attempts stop at chunk 2; the fourth runs through. Each attempt
    // starts at 0 and never repeats or skips an index.
    let indices = device.state.lock().load_indices.clone();
    assert_eq!(
        indices,
        vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 3, 4]
    );
}

#[tokio::test]
async fn test_load_recovers_from_every_retryable_fault() {
    let state = DeviceState::new(v2()).with_faults([
        Fault::new(1, FaultKind::WrongEcho),
        Fault::new(0, FaultKind::Garbled),
        Fault::new(0, FaultKind::CorruptMagic),
    ]);
    let (device, transport) = MockDevice::spawn(state);
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));

    // A wrong echo stops the attempt at once; bad group headers and a bad
    // magic byte only show once all five chunks are in.
    let indices = device.state.lock().load_indices.clone();
    assert_eq!(
        indices,
        vec![0, 1, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4]
    );
}

#[tokio::test(start_paused = true)]
async fn test_load_recovers_from_timeout() {
    let state = DeviceState::new(v2()).with_faults([Fault::new(3, FaultKind::Silent)]);
    let (device, transport) = MockDevice::spawn(state);
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));
    assert_eq!(
        device.state.lock().load_indices,
        vec![0, 1, 2, 3, 0, 1, 2, 3, 4]
    );
}

#[tokio::test]
async fn test_load_gives_up_after_max_attempts() {
    let faults = (0..10).map(|_| Fault::new(0, FaultKind::ShortChunk));
    let state = DeviceState::new(v2()).with_faults(faults);
    let (device, transport) = MockDevice::spawn(state);
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let before = session.snapshot();
    match session.load_settings().await {
        Err(Error::LoadFailed { attempts, last }) => {
            assert_eq!(attempts, 10);
            assert!(matches!(
                *last,
                Error::Protocol(ProtocolError::ChunkLength { index: 0, .. })
            ));
        }
        other => panic!("expected LoadFailed, got {other:?}"),
    }
    assert_eq!(device.state.lock().load_indices.len(), 10);

    // The live record is untouched and the session stays usable.
    assert_eq!(session.snapshot(), before);
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.load_settings().await.unwrap(), sample_record(v2()));
}

#[tokio::test]
async fn test_max_load_attempts_is_configurable() {
    let faults = (0..3).map(|_| Fault::new(1, FaultKind::ShortChunk));
    let state = DeviceState::new(v2()).with_faults(faults);
    let (_device, transport) = MockDevice::spawn(state);
    let config = ProtocolConfig {
        max_load_attempts: 2,
        ..protocol_config()
    };
    let mut session = Session::connect(transport, config).await.unwrap();

    assert!(matches!(
        session.load_settings().await,
        Err(Error::LoadFailed { attempts: 2, .. })
    ));
}

// ============================================================================
// Save
// ============================================================================

#[tokio::test]
async fn test_save_settings() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();
    session.load_settings().await.unwrap();

    {
        let handle = session.settings();
        let mut live = handle.write();
        live.set("led_brightness", 12i64).unwrap();
        live.set("castor_quantize", true).unwrap();
        live.set("lfo_1_frequency", 0.75).unwrap();
    }
    session.save_settings().await.unwrap();

    let state = device.state.lock();
    assert_eq!(state.save_indices, vec![0, 1, 2, 3, 4]);
    let stored = state.stored_record();
    assert_eq!(stored, session.snapshot());
    assert_eq!(stored.get("led_brightness"), Some(Value::Int(12)));
    assert_eq!(stored.get("castor_quantize"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn test_apply_then_save() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    let mut wanted = SettingsRecord::new(v2());
    wanted.set("adc_gain_corr", 2048i64).unwrap();
    wanted.set("pitch_knob_nonlinearity", 0.6).unwrap();
    session.apply(&wanted).unwrap();
    session.save_settings().await.unwrap();

    assert_eq!(device.state.lock().stored_record(), wanted);

    // A record for another schema is refused.
    let other = SettingsRecord::new(std::sync::Arc::new(
        gemsync::record::preset("gemini-v3").unwrap(),
    ));
    assert!(session.apply(&other).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_save_is_not_retried() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();
    device.state.lock().mute = true;

    let result = session.save_settings().await;
    assert!(matches!(result, Err(Error::Timeout { command: 0x09, .. })));
    assert_eq!(session.state(), ConnectionState::Connected);

    let state = device.state.lock();
    let saves = state
        .requests
        .iter()
        .filter(|c| **c == Command::SaveSettingsChunk)
        .count();
    assert_eq!(saves, 1);
}

// ============================================================================
// Single-shot transfer
// ============================================================================

#[tokio::test]
async fn test_single_shot_transfer() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let config = ProtocolConfig {
        transfer: TransferMode::SingleShot,
        ..protocol_config()
    };
    let mut session = Session::connect(transport, config).await.unwrap();

    let mut record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));

    record.set("chorus_max_intensity", 0.1).unwrap();
    session.apply(&record).unwrap();
    session.save_settings().await.unwrap();

    let state = device.state.lock();
    assert_eq!(state.stored_record(), record);
    assert!(state.load_indices.is_empty());
    assert_eq!(
        state.requests[2..],
        [Command::ReadSettings, Command::WriteSettings]
    );
}

// ============================================================================
// Auxiliary commands
// ============================================================================

#[tokio::test]
async fn test_read_adc() {
    let mut state = DeviceState::new(v2());
    state.adc[3] = 1234;
    state.adc[7] = 0x0fff;
    let (_device, transport) = MockDevice::spawn(state);
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();

    assert_eq!(session.read_adc(3).await.unwrap(), 1234);
    assert_eq!(session.read_adc(7).await.unwrap(), 4095);
    let average = session.read_adc_average(3, 4).await.unwrap();
    assert!((average - 1234.0).abs() < f64::EPSILON);
    assert!(session.read_adc_average(3, 0).await.is_err());
}

#[tokio::test]
async fn test_resets_expect_no_response() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();
    session.load_settings().await.unwrap();

    session.reset_settings().await.unwrap();
    assert_eq!(session.snapshot(), SettingsRecord::new(v2()));

    session.soft_reset().await.unwrap();

    // The next exchange is answered normally, so both were processed.
    assert_eq!(session.load_settings().await.unwrap(), SettingsRecord::new(v2()));
    let state = device.state.lock();
    assert_eq!(state.settings_resets, 1);
    assert_eq!(state.soft_resets, 1);
}

// ============================================================================
// Channel loss
// ============================================================================

#[tokio::test]
async fn test_unplugged_device_closes_session() {
    let (device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();
    device.unplug().await;

    let result = session.load_settings().await;
    assert!(matches!(result, Err(Error::Transport(TransportError::Closed))));
    assert_eq!(session.state(), ConnectionState::Closed);

    // Further operations are refused without touching the channel.
    assert!(matches!(
        session.read_adc(0).await,
        Err(Error::Transport(TransportError::Closed))
    ));
}

#[tokio::test]
async fn test_disconnect_returns_info() {
    let (_device, transport) = MockDevice::spawn(DeviceState::new(v2()));
    let session = Session::connect(transport, protocol_config()).await.unwrap();
    let info = session.disconnect().await.unwrap();
    assert_eq!(info.firmware.raw, FIRMWARE);
    assert_eq!(info.serial.to_string().len(), 32);
}
