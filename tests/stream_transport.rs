//! Full sessions over raw byte streams: an in-process duplex with realtime
//! bytes mixed into the device output, and named pipes opened through the
//! port configuration the same way a raw-MIDI node is.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

use common::*;
use gemsync::config::Config;
use gemsync::protocol::{Request, SysexCodec};
use gemsync::session::{ProtocolConfig, Session};
use gemsync::transport::{open_port, MidiTransport, PortPath, StreamTransport, SysexChannel};

const TIMING_CLOCK: u8 = 0xF8;
const ACTIVE_SENSING: u8 = 0xFE;

fn spawn_stream_device(state: Arc<Mutex<DeviceState>>, io: DuplexStream) {
    tokio::spawn(async move {
        let mut framed = Framed::new(io, SysexCodec::new());
        while let Some(Ok(raw)) = framed.next().await {
            let reply = state.lock().handle(&raw);
            let Some(reply) = reply else { continue };

            // Realtime bytes on the wire are dropped by the host decoder.
            if framed.get_mut().write_all(&[TIMING_CLOCK]).await.is_err() {
                break;
            }
            if framed.send(reply).await.is_err() {
                break;
            }
            if framed.get_mut().write_all(&[ACTIVE_SENSING]).await.is_err() {
                break;
            }
        }
    });
}

#[tokio::test]
async fn test_session_over_byte_stream() {
    let (host_io, device_io) = tokio::io::duplex(1024);
    let state = Arc::new(Mutex::new(DeviceState::new(v2())));
    spawn_stream_device(Arc::clone(&state), device_io);

    let transport = Box::new(StreamTransport::new("Gemini", host_io));
    let mut session = Session::connect(transport, protocol_config()).await.unwrap();
    assert_eq!(session.info().port, "Gemini");

    let mut record = session.load_settings().await.unwrap();
    assert_eq!(record, sample_record(v2()));

    record.set("led_brightness", 99i64).unwrap();
    session.apply(&record).unwrap();
    session.save_settings().await.unwrap();
    assert_eq!(state.lock().stored_record(), record);

    let info = session.disconnect().await.unwrap();
    assert_eq!(info.serial.as_str(), "101112131415161718191a1b1c1d1e1f");
}

#[tokio::test]
async fn test_stray_bytes_before_reply_are_ignored() {
    let (host_io, mut device_io) = tokio::io::duplex(1024);
    let transport = StreamTransport::new("Gemini", host_io);

    // An aborted message, loose data bytes, then a complete reply.
    device_io
        .write_all(&[0xF0, 0x77, 0x01, 0x90, 0x12, 0x34, 0xF0, 0x77, 0x01, 0x41, 0xF7])
        .await
        .unwrap();

    let message = transport.receive().await.unwrap();
    assert_eq!(message, vec![0xF0, 0x77, 0x01, 0x41, 0xF7]);
}

// ============================================================================
// Named pipes
// ============================================================================

const DEADLINE: Duration = Duration::from_secs(10);

fn make_fifo(path: &Path) {
    use nix::sys::stat::Mode;
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
}

/// Pipes for one emulated port: `(from device, to device)`.
fn fifo_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let from_device = dir.join("gemini-out");
    let to_device = dir.join("gemini-in");
    make_fifo(&from_device);
    make_fifo(&to_device);
    (from_device, to_device)
}

fn fifo_config(from_device: PathBuf, to_device: PathBuf, protocol: ProtocolConfig) -> Config {
    let mut config = Config::default();
    config.device.ports.insert(
        "Gemini".into(),
        PortPath::Split {
            input: from_device,
            output: to_device,
        },
    );
    config.protocol = protocol;
    config
}

/// Serve `state` over the pipes until the host closes its output.
async fn serve_fifos(state: Arc<Mutex<DeviceState>>, from_device: PathBuf, to_device: PathBuf) {
    // Opening a pipe blocks until the other end shows up; use the host's order.
    let output = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&from_device)
        .await
        .unwrap();
    let input = tokio::fs::File::open(&to_device).await.unwrap();

    let mut requests = FramedRead::new(input, SysexCodec::new());
    let mut replies = FramedWrite::new(output, SysexCodec::new());
    while let Some(Ok(raw)) = requests.next().await {
        let reply = state.lock().handle(&raw);
        if let Some(reply) = reply {
            if replies.send(reply).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_first_exchange_on_opened_port() {
    let dir = tempfile::tempdir().unwrap();
    let (from_device, to_device) = fifo_pair(dir.path());
    let state = Arc::new(Mutex::new(DeviceState::new(v2())));
    let device = tokio::spawn(serve_fifos(
        Arc::clone(&state),
        from_device.clone(),
        to_device.clone(),
    ));

    let config = fifo_config(from_device, to_device, protocol_config());
    let transport = tokio::time::timeout(DEADLINE, open_port("Gemini", &config.device))
        .await
        .unwrap()
        .unwrap();
    let mut channel = SysexChannel::new(transport);

    // The exchange drains the silent input before sending; that must not
    // hold up the request.
    let response = tokio::time::timeout(
        DEADLINE,
        channel.transact(&Request::hello(), Duration::from_millis(500)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.text().unwrap(), FIRMWARE);

    channel.close().await.unwrap();
    tokio::time::timeout(DEADLINE, device).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_session_over_fifo_port_recovers_from_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let (from_device, to_device) = fifo_pair(dir.path());
    let state = Arc::new(Mutex::new(
        DeviceState::new(v2()).with_faults([Fault::new(2, FaultKind::Silent)]),
    ));
    let device = tokio::spawn(serve_fifos(
        Arc::clone(&state),
        from_device.clone(),
        to_device.clone(),
    ));

    let protocol = ProtocolConfig {
        exchange_timeout: Duration::from_millis(300),
        ..protocol_config()
    };
    let config = fifo_config(from_device, to_device, protocol);
    let mut session = tokio::time::timeout(DEADLINE, Session::open(&config, None))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.info().port, "Gemini");

    // Chunk 2 goes unanswered once; the restarted load gets through.
    let record = tokio::time::timeout(DEADLINE, session.load_settings())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record, sample_record(v2()));
    assert_eq!(state.lock().load_indices, vec![0, 1, 2, 0, 1, 2, 3, 4]);

    let mut changed = record.clone();
    changed.set("led_brightness", 7i64).unwrap();
    session.apply(&changed).unwrap();
    tokio::time::timeout(DEADLINE, session.save_settings())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.lock().stored_record(), changed);

    session.disconnect().await.unwrap();
    tokio::time::timeout(DEADLINE, device).await.unwrap().unwrap();
}
