//! Shared test infrastructure: an emulated device on the far end of a
//! [`MemoryTransport`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use gemsync::chunked::ChunkPlan;
use gemsync::protocol::{Command, Request, Response};
use gemsync::record::{preset, Schema, SettingsRecord};
use gemsync::session::ProtocolConfig;
use gemsync::teeth;
use gemsync::transport::{MemoryTransport, MidiTransport};

pub const FIRMWARE: &str = "2022.03.14 (test build)";
pub const CHUNK_SIZE: usize = 20;

// ============================================================================
// Faults
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Drop the last byte of the chunk.
    ShortChunk,
    /// Do not answer.
    Silent,
    /// Serve the chunk from a copy whose magic byte is flipped.
    CorruptMagic,
    /// Answer with the wrong command byte.
    WrongEcho,
    /// Replace the first byte with an invalid group header.
    Garbled,
}

/// A fault fired on the next load of chunk `at_chunk`.
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub at_chunk: u8,
    pub kind: FaultKind,
}

impl Fault {
    pub fn new(at_chunk: u8, kind: FaultKind) -> Self {
        Self { at_chunk, kind }
    }
}

// ============================================================================
// Device
// ============================================================================

pub struct DeviceState {
    pub firmware: String,
    pub serial: Vec<u8>,
    pub schema: Arc<Schema>,
    pub stored: Vec<u8>,
    pub chunk_size: usize,
    pub faults: VecDeque<Fault>,
    pub mute: bool,
    pub adc: [u16; 8],
    pub requests: Vec<Command>,
    pub load_indices: Vec<u8>,
    pub save_indices: Vec<u8>,
    pub soft_resets: u32,
    pub settings_resets: u32,
    pending_save: Vec<u8>,
}

impl DeviceState {
    pub fn new(schema: Arc<Schema>) -> Self {
        let stored = sample_record(Arc::clone(&schema)).pack();
        let mut serial: Vec<u8> = (0x10..0x20).collect();
        serial.push(5);

        Self {
            firmware: FIRMWARE.into(),
            serial,
            schema,
            stored,
            chunk_size: CHUNK_SIZE,
            faults: VecDeque::new(),
            mute: false,
            adc: [0; 8],
            requests: Vec::new(),
            load_indices: Vec::new(),
            save_indices: Vec::new(),
            soft_resets: 0,
            settings_resets: 0,
            pending_save: Vec::new(),
        }
    }

    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    pub fn stored_record(&self) -> SettingsRecord {
        SettingsRecord::unpack(Arc::clone(&self.schema), &self.stored).unwrap()
    }

    /// Answer one raw request, as the firmware would.
    pub fn handle(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        let request = Request::decode(raw).ok()?;
        self.requests.push(request.command);
        if self.mute {
            return None;
        }

        let reply = |command, payload| Some(Response::new(command, payload).encode());
        match request.command {
            Command::Hello => reply(Command::Hello, self.firmware.as_bytes().to_vec()),
            Command::GetSerialNumber => reply(Command::GetSerialNumber, teeth::encode(&self.serial)),
            Command::LoadSettingsChunk => self.load_chunk(request.prefix.unwrap_or_default()),
            Command::SaveSettingsChunk => {
                self.save_chunk(request.prefix.unwrap_or_default(), &request.payload)
            }
            Command::ReadSettings => reply(Command::ReadSettings, teeth::encode(&self.stored)),
            Command::WriteSettings => {
                self.stored = teeth::decode(&request.payload).unwrap();
                reply(Command::WriteSettings, Vec::new())
            }
            Command::ReadAdc => {
                let channel = usize::from(request.prefix.unwrap_or_default());
                let code = self.adc.get(channel).copied().unwrap_or_default();
                reply(Command::ReadAdc, teeth::encode(&code.to_be_bytes()))
            }
            Command::SoftReset => {
                self.soft_resets += 1;
                None
            }
            Command::ResetSettings => {
                self.settings_resets += 1;
                self.stored = SettingsRecord::new(Arc::clone(&self.schema)).pack();
                None
            }
        }
    }

    fn load_chunk(&mut self, index: u8) -> Option<Vec<u8>> {
        self.load_indices.push(index);

        let fault = match self.faults.front() {
            Some(f) if f.at_chunk == index => self.faults.pop_front().map(|f| f.kind),
            _ => None,
        };

        let encoded = if fault == Some(FaultKind::CorruptMagic) {
            let mut corrupt = self.stored.clone();
            corrupt[0] ^= 0x01;
            teeth::encode(&corrupt)
        } else {
            teeth::encode(&self.stored)
        };
        let plan = ChunkPlan::new(encoded.len(), self.chunk_size).unwrap();
        let mut payload = encoded[plan.range(usize::from(index))].to_vec();

        match fault {
            Some(FaultKind::ShortChunk) => {
                payload.pop();
            }
            Some(FaultKind::Silent) => return None,
            Some(FaultKind::WrongEcho) => {
                return Some(Response::new(Command::Hello, payload).encode());
            }
            Some(FaultKind::Garbled) => payload[0] = 0x00,
            Some(FaultKind::CorruptMagic) | None => {}
        }

        Some(Response::new(Command::LoadSettingsChunk, payload).encode())
    }

    fn save_chunk(&mut self, index: u8, payload: &[u8]) -> Option<Vec<u8>> {
        self.save_indices.push(index);
        if index == 0 {
            self.pending_save.clear();
        }
        self.pending_save.extend_from_slice(payload);

        if self.pending_save.len() == teeth::encoded_length(self.schema.packed_size()) {
            self.stored = teeth::decode(&self.pending_save).unwrap();
            self.pending_save.clear();
        }
        Some(Response::new(Command::SaveSettingsChunk, Vec::new()).encode())
    }
}

/// A running emulated device.
pub struct MockDevice {
    pub state: Arc<Mutex<DeviceState>>,
    task: JoinHandle<()>,
}

impl MockDevice {
    /// Start the device; returns it with the host end of the pipe.
    pub fn spawn(state: DeviceState) -> (Self, Box<dyn MidiTransport>) {
        let (host, device) = MemoryTransport::pair("Gemini");
        let state = Arc::new(Mutex::new(state));
        let shared = Arc::clone(&state);

        let task = tokio::spawn(async move {
            while let Ok(raw) = device.receive().await {
                let reply = shared.lock().handle(&raw);
                if let Some(reply) = reply {
                    if device.send(&reply).await.is_err() {
                        break;
                    }
                }
            }
        });

        (Self { state, task }, Box::new(host))
    }

    /// Wait for the host to hang up; false if it is still connected.
    pub async fn closed(self) -> bool {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.task)
            .await
            .is_ok()
    }

    /// Disconnect the device.
    pub async fn unplug(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn v2() -> Arc<Schema> {
    Arc::new(preset("gemini-v2").unwrap())
}

/// A record that differs from the defaults in a few fields.
pub fn sample_record(schema: Arc<Schema>) -> SettingsRecord {
    let mut record = SettingsRecord::new(schema);
    record.set("adc_gain_corr", 2051i64).unwrap();
    record.set("adc_offset_corr", -12i64).unwrap();
    record.set("led_brightness", 200i64).unwrap();
    record.set("pitch_knob_nonlinearity", 0.62).unwrap();
    record
}

pub fn protocol_config() -> ProtocolConfig {
    ProtocolConfig {
        chunk_size: CHUNK_SIZE,
        ..Default::default()
    }
}
