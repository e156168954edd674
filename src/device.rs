//! ==============================================================================
//! device.rs - device link (serial line in, mode tokens out)
//! ==============================================================================
//!
//! purpose:
//!     turns the serial byte stream into readings and sends mode tokens back.
//!
//! responsibilities:
//!     - LineReader: blocking newline-delimited reads, lossy utf-8 decode
//!     - LineParser: `key:value` (or bare scalar) -> Reading
//!     - CommandWriter: the only path that writes to the device
//!     - Ingestor: the sequential read -> parse -> update -> append loop
//!
//! relationships:
//!     - uses: transport.rs (reader / writer halves)
//!     - writes: state.rs (StateStore::update), record_log.rs (RecordLog::append)
//!     - used by: main.rs (ingestion thread), gateway.rs (CommandWriter)
//!
//! ==============================================================================

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::IngestMode;
use crate::domain::{ModeToken, Reading, UnitTable, SCALAR_KEY};
use crate::error::Result;
use crate::record_log::RecordLog;
use crate::state::StateStore;
use crate::transport::{TransportReader, TransportWriter};

/// separator between key and value on a device line
const SEPARATOR: char = ':';

// ==============================================================================
// reading side
// ==============================================================================

/// buffered newline-delimited reader over the transport's read half
pub struct LineReader<R: Read = TransportReader> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { inner: BufReader::new(reader), buf: Vec::new() }
    }

    /// block until a full line arrives; `None` at end of stream
    ///
    /// read timeouts are retried, so from the caller's side this blocks
    /// indefinitely. invalid utf-8 is replaced with U+FFFD. a trailing
    /// fragment without a newline is returned as the last line.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        loop {
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(0) => break,
                Ok(_) if self.buf.ends_with(b"\n") => break,
                Ok(_) => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end().to_string()))
    }
}

/// turns raw device lines into readings
#[derive(Clone, Debug)]
pub struct LineParser {
    mode: IngestMode,
    units: UnitTable,
}

impl LineParser {
    pub fn new(mode: IngestMode, units: UnitTable) -> Self {
        Self { mode, units }
    }

    /// `None` for lines that carry no reading
    pub fn parse_line(&self, raw: &str) -> Option<Reading> {
        let line = raw.trim();
        if line.is_empty() {
            return None;
        }

        let (key, value) = match line.split_once(SEPARATOR) {
            Some((key, value)) => (key.trim(), value.trim()),
            None if self.mode == IngestMode::Single => (SCALAR_KEY, line),
            None => return None,
        };

        Some(Reading::now(key, value, self.units.unit_for(key)))
    }
}

// ==============================================================================
// writing side
// ==============================================================================

/// shared, serialized access to the transport's write half
#[derive(Clone)]
pub struct CommandWriter {
    writer: Arc<Mutex<TransportWriter>>,
}

impl CommandWriter {
    pub fn new(writer: TransportWriter) -> Self {
        Self { writer: Arc::new(Mutex::new(writer)) }
    }

    /// transmit a raw token; anything outside the six mode tokens is
    /// rejected before touching the device
    pub fn send_command(&self, token: &str) -> Result<()> {
        let mode: ModeToken = token.parse()?;
        self.send_mode(mode)
    }

    /// transmit exactly the token bytes, no terminator
    pub fn send_mode(&self, mode: ModeToken) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(mode.as_str().as_bytes())?;
        writer.flush()?;
        tracing::info!(mode = %mode, "Message <{}> sent to device", mode);
        Ok(())
    }
}

// ==============================================================================
// ingestion loop
// ==============================================================================

/// owns the read side and fans each reading out to state and log
pub struct Ingestor {
    parser: LineParser,
    state: StateStore,
    log: RecordLog,
    show_readings: bool,
}

impl Ingestor {
    pub fn new(parser: LineParser, state: StateStore, log: RecordLog, show_readings: bool) -> Self {
        Self { parser, state, log, show_readings }
    }

    /// handle one raw line; returns the reading if the line produced one
    ///
    /// a failed append is logged and dropped, the state update still counts.
    pub fn ingest_line(&self, raw: &str) -> Option<Reading> {
        let reading = self.parser.parse_line(raw)?;

        self.state.update(&reading);

        if self.show_readings {
            tracing::info!(key = %reading.key, value = %reading.value, "Received from device");
        } else {
            tracing::debug!(key = %reading.key, value = %reading.value, "Received from device");
        }

        if let Err(e) = self.log.append(&reading) {
            tracing::error!("Record log append abandoned: {}", e);
        }

        Some(reading)
    }

    /// run until the transport reports end of stream or a hard read error
    pub fn run<R: Read>(&self, mut lines: LineReader<R>) -> Result<()> {
        while let Some(line) = lines.read_line()? {
            self.ingest_line(&line);
        }
        tracing::info!("Serial stream ended");
        Ok(())
    }
}
