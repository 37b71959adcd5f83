//! Mock adapters for integration tests.
//!
//! Every port is backed by a recorder so tests can assert on the full
//! history without a display server, a collector or a flash partition.

use std::cell::Cell;

use emon::app::events::AppEvent;
use emon::app::ports::{
    ClockPort, CounterStore, DisplayPort, EventSink, PersistenceError, ReportPort, SubmitOutcome,
};
use emon::clock::{Timestamp, WallTime};
use emon::display::DisplayLines;
use emon::events::{EdgeEvent, Event};
use emon::meter::pulse::Edge;
use emon::meter::{Counters, Measurement};

// ── Display ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockDisplay {
    pub frames: Vec<[String; 3]>,
    pub closed: bool,
}

#[allow(dead_code)]
impl MockDisplay {
    pub fn last_power_line(&self) -> Option<&str> {
        self.frames.last().map(|f| f[0].as_str())
    }
}

impl DisplayPort for MockDisplay {
    fn show(&mut self, lines: &DisplayLines) {
        let mut it = lines.iter().map(str::to_owned);
        let frame = [
            it.next().unwrap_or_default(),
            it.next().unwrap_or_default(),
            it.next().unwrap_or_default(),
        ];
        self.frames.push(frame);
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// ── Reports ───────────────────────────────────────────────────

/// Accepts everything unless `busy` is set.
#[derive(Default)]
pub struct MockReports {
    pub submitted: Vec<Measurement>,
    pub busy: bool,
}

impl ReportPort for MockReports {
    fn submit(&mut self, measurement: Measurement) -> SubmitOutcome {
        if self.busy {
            return SubmitOutcome::Busy;
        }
        self.submitted.push(measurement);
        SubmitOutcome::Accepted
    }
}

// ── Counter store ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Vec<Counters>,
    pub fail_with: Option<PersistenceError>,
}

impl CounterStore for MemoryStore {
    fn load(&self) -> Result<Option<Counters>, PersistenceError> {
        Ok(self.saved.last().copied())
    }

    fn save(&mut self, counters: &Counters) -> Result<(), PersistenceError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.saved.push(*counters);
        Ok(())
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Wall time set by the test; `None` models an unsynced clock.
#[derive(Default)]
pub struct MockClock {
    pub wall: Cell<Option<WallTime>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn at(hour: u8, minute: u8, mday: u8) -> Self {
        Self {
            wall: Cell::new(Some(WallTime::new(hour, minute, mday))),
        }
    }

    pub fn set(&self, hour: u8, minute: u8, mday: u8) {
        self.wall.set(Some(WallTime::new(hour, minute, mday)));
    }
}

impl ClockPort for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp::default()
    }

    fn wall_time(&self) -> Option<WallTime> {
        self.wall.get()
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

// ── Edge helpers ──────────────────────────────────────────────

/// Falling edge at `start_ms`, rising edge `length_ms` later.
pub fn pulse(start_ms: u64, length_ms: u64) -> [Event; 2] {
    [
        Event::Edge(EdgeEvent {
            edge: Edge::Falling,
            at: Timestamp::from_millis(start_ms),
        }),
        Event::Edge(EdgeEvent {
            edge: Edge::Rising,
            at: Timestamp::from_millis(start_ms + length_ms),
        }),
    ]
}
