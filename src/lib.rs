//! ==============================================================================
//! serial-gateway - udp <-> serial device gateway
//! ==============================================================================
//!
//! relays mode commands from udp clients to a line-oriented serial device,
//! keeps the latest device readings for query replies, and appends every
//! reading to a json record log.
//!
//! ```text
//!     serial device ──lines──> Ingestor ──update──> StateStore <──snapshot── Gateway <── udp
//!           ▲                      │                                        │
//!           │                      └──append──> RecordLog                   │
//!           └──────── mode tokens ──────── CommandWriter <──── SetMode ─────┘
//! ```
//!
//! ==============================================================================

pub mod config;
pub mod device;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod record_log;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
