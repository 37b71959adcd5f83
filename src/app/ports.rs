//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ MeterService (domain)
//! ```
//!
//! Driven adapters (display, counter file, telemetry transport, event sinks)
//! implement these traits.  The [`MeterService`](super::service::MeterService)
//! consumes them via generics, so the metering core never touches hardware,
//! sockets or the filesystem directly.
//!
//! All port errors are typed `Copy` enums; callers handle every variant.

use core::fmt;

use crate::clock::{Timestamp, WallTime};
use crate::display::DisplayLines;
use crate::meter::{Counters, Measurement};

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → local display)
// ───────────────────────────────────────────────────────────────

/// Local three-line display.  Delivery is best effort: adapters log and
/// swallow their own failures, and bound any reconnect they attempt.
pub trait DisplayPort {
    fn show(&mut self, lines: &DisplayLines);

    /// Release the display on shutdown.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Counter store port (driven adapter: domain ↔ flash)
// ───────────────────────────────────────────────────────────────

/// Durable two-counter record.
///
/// - `load` returns `Ok(None)` when nothing has been saved yet.
/// - A short or unparsable record is an error, not an empty store.
/// - No freshness check: a record saved before midnight is restored as-is.
/// - `save` runs on the event loop; the firmware wraps flash in
///   [`BackgroundStore`](crate::adapters::background_store::BackgroundStore).
pub trait CounterStore {
    fn load(&self) -> Result<Option<Counters>, PersistenceError>;

    fn save(&mut self, counters: &Counters) -> Result<(), PersistenceError>;
}

// ───────────────────────────────────────────────────────────────
// Report port (driven adapter: domain → dispatcher)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Snapshot handed to the report worker.
    Accepted,
    /// A report is already in flight; snapshot dropped.
    Busy,
}

/// Non-blocking hand-off of a measurement to the telemetry path.
pub trait ReportPort {
    fn submit(&mut self, measurement: Measurement) -> SubmitOutcome;
}

// ───────────────────────────────────────────────────────────────
// Telemetry transport port (driven adapter: worker → network)
// ───────────────────────────────────────────────────────────────

/// Blocking HTTP GET used by the report worker only.
pub trait TelemetryPort {
    /// Perform the request and return the response body.
    fn get(&mut self, url: &str) -> Result<String, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain ← system time)
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Monotonic time for pulse timestamps.
    fn now(&self) -> Timestamp;

    /// Local wall time, or `None` until the clock has been synchronised.
    fn wall_time(&self) -> Option<WallTime>;
}

// ───────────────────────────────────────────────────────────────
// Accounting delegate (decouples the accounting clock from I/O)
// ───────────────────────────────────────────────────────────────

/// Callback the [`AccountingClock`](crate::accounting::AccountingClock)
/// invokes when a wall-clock event fires.  The clock itself knows nothing
/// about files, displays or the network.
pub trait AccountingDelegate {
    /// `counters` reflects any reset already applied.
    fn on_accounting(&mut self, fired: AccountingFired, counters: &Counters);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingFired {
    /// Daily counter zeroed; `previous` is the pulse count it held.
    DailyReset { previous: u64 },
    /// Monthly counter zeroed on day 1.
    MonthlyReset { previous: u64 },
    /// First tick in minute zero of an hour.
    FullHour,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`CounterStore`] operations.  Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// Underlying file I/O failed.
    Io(std::io::ErrorKind),
    /// Record ended before both counters were read.
    Truncated,
    /// A counter line was not an unsigned integer (1-based line number).
    Malformed { line: u8 },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "I/O error: {}", kind),
            Self::Truncated => write!(f, "counter record truncated"),
            Self::Malformed { line } => write!(f, "counter record malformed at line {}", line),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Errors from the telemetry path.  Logged, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No API key configured; nothing was sent.
    MissingApiKey,
    /// Request URL did not fit the fixed-size buffer.
    UrlTooLong,
    /// Connection, send or receive failed (including timeout).
    Connection,
    /// Collector answered with a non-2xx status.
    HttpStatus(u16),
    /// Collector answered but not with `ok`.
    Rejected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "no API key configured"),
            Self::UrlTooLong => write!(f, "request URL too long"),
            Self::Connection => write!(f, "connection failed"),
            Self::HttpStatus(code) => write!(f, "HTTP status {}", code),
            Self::Rejected => write!(f, "collector rejected the data"),
        }
    }
}
