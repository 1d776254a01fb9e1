//! Error types for gemsync.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for gemsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gemsync.
///
/// The session layer is the only place that decides whether an error is
/// retried; see [`Error::is_retryable`].
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("transport unavailable: unable to open {port}: {reason}")]
    TransportUnavailable { port: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no response to command {command:#04x} within {after:?}")]
    Timeout { command: u8, after: Duration },

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    // Session errors
    #[error("firmware {version} is older than the minimum supported {minimum}")]
    IncompatibleFirmware { version: String, minimum: String },

    #[error("unable to load settings after {attempts} attempts: {last}")]
    LoadFailed { attempts: u32, last: Box<Error> },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a [`crate::transport::MidiTransport`] implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("channel closed")]
    Closed,
}

/// Malformed or unexpected messages on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message too short: {len} bytes")]
    MessageTooShort { len: usize },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("missing start marker, got {got:#04x}")]
    MissingStart { got: u8 },

    #[error("missing end marker, got {got:#04x}")]
    MissingEnd { got: u8 },

    #[error("unexpected manufacturer tag {got:#04x}")]
    UnexpectedManufacturer { got: u8 },

    #[error("unexpected response command: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedCommand { expected: u8, got: u8 },

    #[error("byte {byte:#04x} at offset {offset} is not 7-bit safe")]
    NotSevenBitSafe { byte: u8, offset: usize },

    #[error("chunk {index} has {got} bytes, expected {expected}")]
    ChunkLength { index: u8, expected: usize, got: usize },

    #[error("chunk index {index} out of range (chunk count {count})")]
    ChunkIndex { index: usize, count: usize },

    #[error("buffer length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Decoded record failed its magic-byte check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("schema {schema}: magic byte {got:#04x} does not match expected {expected:#04x}")]
pub struct IntegrityError {
    pub schema: String,
    pub expected: u8,
    pub got: u8,
}

/// Malformed teeth-encoded input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("dangling header byte at offset {offset}")]
    DanglingHeader { offset: usize },

    #[error("group at offset {offset} declares {count} bytes")]
    InvalidCount { offset: usize, count: u8 },

    #[error("group at offset {offset} declares {count} bytes but carries {available}")]
    TruncatedGroup {
        offset: usize,
        count: u8,
        available: usize,
    },

    #[error("byte {byte:#04x} at offset {offset} has its high bit set")]
    HighBitSet { offset: usize, byte: u8 },
}

/// Invalid field assignment on a settings record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unknown field {0}")]
    UnknownField(String),

    #[error("field {field} expects {expected}, got {got}")]
    KindMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("value {value} out of range for field {field} ({kind})")]
    OutOfRange {
        field: String,
        kind: &'static str,
        value: String,
    },

    #[error("schema {schema} mismatch: record belongs to {other}")]
    SchemaMismatch { schema: String, other: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl Error {
    /// Check if error is transient and worth another full load attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::Integrity(_) | Error::Codec(_) | Error::Timeout { .. }
        )
    }

    /// Check if error means the channel itself is gone.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Error::TransportUnavailable { .. }
                | Error::Transport(TransportError::Closed)
                | Error::IncompatibleFirmware { .. }
        )
    }
}

/// Error context for debugging.
#[derive(Debug)]
pub struct ErrorContext {
    pub port: Option<String>,
    pub command: Option<u8>,
    pub operation: String,
    pub attempt: Option<u32>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation={}", self.operation)?;
        if let Some(ref port) = self.port {
            write!(f, ", port={port}")?;
        }
        if let Some(command) = self.command {
            write!(f, ", command={command:#04x}")?;
        }
        if let Some(attempt) = self.attempt {
            write!(f, ", attempt={attempt}")?;
        }
        Ok(())
    }
}
