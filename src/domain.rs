//! ==============================================================================
//! domain.rs - gateway data model
//! ==============================================================================
//!
//! purpose:
//!     the types that flow between the device link, the state store, the
//!     record log and the gateway server.
//!
//! relationships:
//!     - produced by: device.rs (Reading), gateway.rs (Command)
//!     - consumed by: state.rs, record_log.rs, gateway.rs
//!
//! ==============================================================================

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// timestamp format used for readings (local time, second resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// key given to a reading whose line carried no `key:` prefix (single mode)
pub const SCALAR_KEY: &str = "value";

/// the literal action string that requests a snapshot
pub const QUERY_ACTION: &str = "getValues()";

/// one parsed measurement from the device
///
/// field order matches the persisted record layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// ingestion time, `%Y-%m-%dT%H:%M:%S` local
    pub timestamp: String,
    /// measured quantity (e.g. "temperature")
    pub key: String,
    /// unit looked up from the key, empty when unknown
    pub unit: String,
    /// raw textual measurement
    pub value: String,
}

impl Reading {
    /// stamp a reading with the current local time
    pub fn now(key: impl Into<String>, value: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            key: key.into(),
            unit: unit.into(),
            value: value.into(),
        }
    }
}

/// latest value per key, absent keys simply missing
pub type LatestState = BTreeMap<String, String>;

// ==============================================================================
// unit table
// ==============================================================================

/// static key -> unit lookup, optionally extended from config
#[derive(Clone, Debug)]
pub struct UnitTable {
    units: HashMap<String, String>,
}

impl UnitTable {
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        for (key, unit) in overrides {
            table.units.insert(key.clone(), unit.clone());
        }
        table
    }

    /// unit for `key`, empty string if unknown
    pub fn unit_for(&self, key: &str) -> &str {
        self.units.get(key).map(String::as_str).unwrap_or("")
    }
}

impl Default for UnitTable {
    fn default() -> Self {
        let units = [("temperature", "°C"), ("humidity", "%"), ("luminosity", "lux")]
            .into_iter()
            .map(|(k, u)| (k.to_string(), u.to_string()))
            .collect();
        Self { units }
    }
}

// ==============================================================================
// mode tokens
// ==============================================================================

/// the six priority orderings the device understands
///
/// each letter is one quantity (T = temperature, L = luminosity,
/// H = humidity); the token lists them highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeToken {
    Tlh,
    Thl,
    Lth,
    Lht,
    Htl,
    Hlt,
}

impl ModeToken {
    pub const ALL: [ModeToken; 6] = [
        ModeToken::Tlh,
        ModeToken::Thl,
        ModeToken::Lth,
        ModeToken::Lht,
        ModeToken::Htl,
        ModeToken::Hlt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModeToken::Tlh => "TLH",
            ModeToken::Thl => "THL",
            ModeToken::Lth => "LTH",
            ModeToken::Lht => "LHT",
            ModeToken::Htl => "HTL",
            ModeToken::Hlt => "HLT",
        }
    }
}

impl FromStr for ModeToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeToken::ALL
            .into_iter()
            .find(|token| token.as_str() == s)
            .ok_or_else(|| Error::InvalidModeToken(s.to_string()))
    }
}

impl fmt::Display for ModeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// inbound commands
// ==============================================================================

/// a decoded network request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// forward a mode token to the device, no reply
    SetMode(ModeToken),
    /// reply with the current snapshot
    Query,
}

impl Command {
    /// decode a raw datagram
    ///
    /// a valid `command` token wins over any `action`; anything that is json
    /// but neither a known command nor the query action is `UnknownCommand`.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::MalformedInput(format!("payload is not utf-8: {}", e)))?
            .trim();

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedInput(format!("invalid json {:?}: {}", text, e)))?;
        if !value.is_object() {
            return Err(Error::MalformedInput(format!("expected a json object, got {}", value)));
        }

        let command = value.get("command").and_then(serde_json::Value::as_str);
        if let Some(token) = command.and_then(|c| c.parse::<ModeToken>().ok()) {
            return Ok(Command::SetMode(token));
        }

        if value.get("action").and_then(serde_json::Value::as_str) == Some(QUERY_ACTION) {
            return Ok(Command::Query);
        }

        Err(Error::UnknownCommand(value.to_string()))
    }
}
