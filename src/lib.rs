//! # gemsync
//!
//! Settings synchronization for the Gemini oscillator module over MIDI SysEx.
//!
//! The device stores its settings as a fixed-layout binary record. gemsync
//! packs and unpacks that record from a schema, makes it 7-bit safe with the
//! teeth encoding, and moves it over SysEx in numbered chunks with timeouts
//! and a bounded load retry.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Session (connect / load / save)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Settings record (schema, fix16, magic byte, pack)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                Teeth encoding (8-bit → 7-bit groups)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          Chunked transfer (plan, split, reassemble)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        SysEx channel (one exchange at a time, timeouts)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │           Transport (raw-MIDI stream / in-memory pair)          │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]      // Many functions can't be const due to trait bounds
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]        // Byte literals are clear
#![allow(clippy::cast_possible_truncation)]  // Chunk indices are bounded by the plan
#![allow(clippy::cast_sign_loss)]            // Field values are range-checked first
#![allow(clippy::cast_precision_loss)]       // Acceptable for ADC averages
#![allow(clippy::cast_possible_wrap)]        // Intentional for two's complement fields
#![allow(clippy::suboptimal_flops)]          // Clarity over micro-optimization
#![allow(clippy::similar_names)]             // min/max pairs are intentionally named
#![allow(clippy::significant_drop_tightening)] // Lock ordering is intentional
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::redundant_pub_crate)]       // Explicit visibility
#![allow(clippy::too_many_lines)]            // Complete implementations
#![allow(clippy::future_not_send)]           // Async internals
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer
#![allow(clippy::return_self_not_must_use)]  // Builder methods don't need must_use

pub mod calibration;
pub mod chunked;
pub mod config;
pub mod error;
pub mod protocol;
pub mod record;
pub mod session;
pub mod teeth;
pub mod transport;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chunked::{ChunkPlan, TransferMode};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Command, Request, Response};
    pub use crate::record::{Schema, SettingsRecord, Value};
    pub use crate::session::{ProtocolConfig, Session};
    pub use crate::transport::{MemoryTransport, MidiTransport, StreamTransport, SysexChannel};
    pub use crate::types::*;
}
