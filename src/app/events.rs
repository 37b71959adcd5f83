//! Outbound application events.
//!
//! The [`MeterService`](super::service::MeterService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (serial log today).

use crate::meter::pulse::PulseSequenceError;
use crate::meter::{Counters, Measurement, RejectReason};

use super::ports::{PersistenceError, SubmitOutcome};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// Service started with these counters (restored or zero).
    Started(Counters),

    /// A pulse was counted.  `reported` is `None` for the first pulse,
    /// which is never sent to the collector.
    Measured {
        measurement: Measurement,
        reported: Option<SubmitOutcome>,
    },

    /// A pulse was discarded.
    PulseRejected(RejectReason),

    /// Edge arrived in the wrong pulse state.
    OutOfSequence(PulseSequenceError),

    /// Daily counter zeroed at midnight.
    DailyReset { previous_wh: u64 },

    /// Monthly counter zeroed on day 1.
    MonthlyReset { previous_wh: u64 },

    /// Hourly snapshot produced; carries the dispatcher's answer.
    HourlyReport {
        measurement: Measurement,
        outcome: SubmitOutcome,
    },

    /// Record accepted by the store (queued for the store worker on device).
    CountersSaved(Counters),

    /// The store reported a failed write, possibly of an earlier record.
    SaveFailed(PersistenceError),

    /// Events lost to a full event queue since the last report.
    EventsDropped(u32),

    Stopped,
}
