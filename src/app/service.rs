//! Application service, the hexagonal core.
//!
//! [`MeterService`] owns the pulse validator, the power meter, the running
//! counters and the accounting clock.  It is driven one [`Event`] at a time
//! by the main loop and is the only code that mutates metering state.  All
//! I/O flows through port traits injected at call sites, making the whole
//! service testable with mock adapters.
//!
//! ```text
//!                 ┌─────────────────────────────┐ ──▶ DisplayPort
//!  Event ───────▶ │        MeterService         │ ──▶ ReportPort
//!  ClockPort ───▶ │ Validator · Meter · Accounts│ ──▶ CounterStore
//!                 └─────────────────────────────┘ ──▶ EventSink
//! ```

use log::{info, warn};

use crate::accounting::AccountingClock;
use crate::clock::WallTime;
use crate::config::MeterConfig;
use crate::display::DisplayLines;
use crate::events::{EdgeEvent, Event};
use crate::meter::power::{PowerMeter, PowerOutcome};
use crate::meter::pulse::{EdgeOutcome, PulseValidator};
use crate::meter::{Counters, Measurement};

use super::events::AppEvent;
use super::ports::{
    AccountingDelegate, AccountingFired, ClockPort, CounterStore, DisplayPort, EventSink,
    ReportPort,
};

/// What the main loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

// ───────────────────────────────────────────────────────────────
// MeterService
// ───────────────────────────────────────────────────────────────

pub struct MeterService {
    validator: PulseValidator,
    meter: PowerMeter,
    counters: Counters,
    accounting: AccountingClock,
}

impl MeterService {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            validator: PulseValidator::new(config.pulse_length_ms, config.pulse_tolerance_pct),
            meter: PowerMeter::from_config(config),
            counters: Counters::default(),
            accounting: AccountingClock::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Adopt restored counters (if any) and paint the initial display.
    pub fn start(
        &mut self,
        restored: Option<Counters>,
        display: &mut impl DisplayPort,
        sink: &mut impl EventSink,
    ) {
        if let Some(c) = restored {
            info!(
                "MeterService: restored daily counter {}, monthly counter {}",
                c.pulses_today, c.pulses_month
            );
            self.counters = c;
        }
        display.show(&DisplayLines::from_measurement(&self.snapshot()));
        sink.emit(&AppEvent::Started(self.counters));
    }

    // ── Event routing ─────────────────────────────────────────

    /// Process one queued event.
    pub fn handle_event(
        &mut self,
        event: Event,
        clock: &impl ClockPort,
        display: &mut impl DisplayPort,
        reports: &mut impl ReportPort,
        store: Option<&mut dyn CounterStore>,
        sink: &mut impl EventSink,
    ) -> LoopControl {
        match event {
            Event::Edge(edge) => {
                self.handle_edge(edge, display, reports, sink);
                LoopControl::Continue
            }
            Event::Tick => {
                self.tick(clock.wall_time(), display, reports, store, sink);
                LoopControl::Continue
            }
            Event::Shutdown => {
                display.close();
                sink.emit(&AppEvent::Stopped);
                info!("MeterService: shutdown");
                LoopControl::Stop
            }
        }
    }

    /// Feed one edge through validation and metering.
    ///
    /// Returns the measurement if the pulse was counted.
    pub fn handle_edge(
        &mut self,
        edge: EdgeEvent,
        display: &mut impl DisplayPort,
        reports: &mut impl ReportPort,
        sink: &mut impl EventSink,
    ) -> Option<Measurement> {
        let pulse = match self.validator.on_edge(edge.edge, edge.at) {
            EdgeOutcome::Started => return None,
            EdgeOutcome::Valid(pulse) => pulse,
            EdgeOutcome::Rejected(reason) => {
                sink.emit(&AppEvent::PulseRejected(reason));
                return None;
            }
            EdgeOutcome::OutOfSequence(e) => {
                sink.emit(&AppEvent::OutOfSequence(e));
                return None;
            }
        };

        match self.meter.on_pulse(pulse, &mut self.counters) {
            PowerOutcome::First(measurement) => {
                display.show(&DisplayLines::from_measurement(&measurement));
                sink.emit(&AppEvent::Measured {
                    measurement,
                    reported: None,
                });
                Some(measurement)
            }
            PowerOutcome::Measured(measurement) => {
                display.show(&DisplayLines::from_measurement(&measurement));
                let outcome = reports.submit(measurement);
                sink.emit(&AppEvent::Measured {
                    measurement,
                    reported: Some(outcome),
                });
                Some(measurement)
            }
            PowerOutcome::Rejected(reason) => {
                sink.emit(&AppEvent::PulseRejected(reason));
                None
            }
        }
    }

    /// Run the accounting clock for one tick.
    pub fn tick(
        &mut self,
        wall: Option<WallTime>,
        display: &mut impl DisplayPort,
        reports: &mut impl ReportPort,
        store: Option<&mut dyn CounterStore>,
        sink: &mut impl EventSink,
    ) {
        let mut delegate = TickDelegate {
            wh_per_pulse: self.meter.wh_per_pulse(),
            last_power_w: self.meter.last_power_w(),
            reports,
            store,
            sink,
            fired: false,
        };
        self.accounting.tick(wall, &mut self.counters, &mut delegate);

        if delegate.fired {
            display.show(&DisplayLines::from_measurement(&self.snapshot()));
        }
    }

    /// Report events lost to a full queue.
    pub fn report_dropped(&self, dropped: u32, sink: &mut impl EventSink) {
        if dropped > 0 {
            warn!("MeterService: {} events dropped (queue full)", dropped);
            sink.emit(&AppEvent::EventsDropped(dropped));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Current totals with the last accepted power reading.
    pub fn snapshot(&self) -> Measurement {
        Measurement::snapshot(
            self.meter.last_power_w(),
            &self.counters,
            self.meter.wh_per_pulse(),
        )
    }

    /// Reference pulse width in use (learned or configured).
    pub fn reference_pulse_ms(&self) -> u64 {
        self.validator.reference_ms()
    }
}

// ───────────────────────────────────────────────────────────────
// Accounting delegate
// ───────────────────────────────────────────────────────────────

/// Bridges accounting clock callbacks to the ports for one tick.
struct TickDelegate<'a, 's, R: ReportPort, E: EventSink> {
    wh_per_pulse: u32,
    last_power_w: u32,
    reports: &'a mut R,
    store: Option<&'a mut (dyn CounterStore + 's)>,
    sink: &'a mut E,
    fired: bool,
}

impl<R: ReportPort, E: EventSink> AccountingDelegate for TickDelegate<'_, '_, R, E> {
    fn on_accounting(&mut self, fired: AccountingFired, counters: &Counters) {
        self.fired = true;
        let wh = u64::from(self.wh_per_pulse);

        match fired {
            AccountingFired::DailyReset { previous } => {
                self.sink.emit(&AppEvent::DailyReset {
                    previous_wh: previous.saturating_mul(wh),
                });
            }
            AccountingFired::MonthlyReset { previous } => {
                self.sink.emit(&AppEvent::MonthlyReset {
                    previous_wh: previous.saturating_mul(wh),
                });
            }
            AccountingFired::FullHour => {
                if let Some(store) = self.store.as_deref_mut() {
                    match store.save(counters) {
                        Ok(()) => self.sink.emit(&AppEvent::CountersSaved(*counters)),
                        Err(e) => {
                            warn!("MeterService: counter save failed: {}", e);
                            self.sink.emit(&AppEvent::SaveFailed(e));
                        }
                    }
                }

                let measurement = Measurement::snapshot(self.last_power_w, counters, self.wh_per_pulse);
                let outcome = self.reports.submit(measurement);
                self.sink.emit(&AppEvent::HourlyReport {
                    measurement,
                    outcome,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{PersistenceError, SubmitOutcome};
    use crate::clock::Timestamp;
    use crate::meter::pulse::Edge;

    #[derive(Default)]
    struct Recorder {
        shown: Vec<DisplayLines>,
        submitted: Vec<Measurement>,
        events: Vec<AppEvent>,
        closed: bool,
    }

    impl DisplayPort for Recorder {
        fn show(&mut self, lines: &DisplayLines) {
            self.shown.push(lines.clone());
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    impl ReportPort for Recorder {
        fn submit(&mut self, m: Measurement) -> SubmitOutcome {
            self.submitted.push(m);
            SubmitOutcome::Accepted
        }
    }

    impl EventSink for Recorder {
        fn emit(&mut self, e: &AppEvent) {
            self.events.push(*e);
        }
    }

    struct FailingStore;

    impl CounterStore for FailingStore {
        fn load(&self) -> Result<Option<Counters>, PersistenceError> {
            Ok(None)
        }
        fn save(&mut self, _: &Counters) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io(std::io::ErrorKind::PermissionDenied))
        }
    }

    fn cfg() -> MeterConfig {
        MeterConfig {
            pulse_length_ms: 100,
            max_power_w: 10_000,
            ..MeterConfig::default()
        }
    }

    fn pulse(svc: &mut MeterService, rec: &mut Recorder, start_ms: u64) -> Option<Measurement> {
        let (mut d, mut r, mut s) = (Recorder::default(), Recorder::default(), Recorder::default());
        let fall = EdgeEvent {
            edge: Edge::Falling,
            at: Timestamp::from_millis(start_ms),
        };
        let rise = EdgeEvent {
            edge: Edge::Rising,
            at: Timestamp::from_millis(start_ms + 100),
        };
        svc.handle_edge(fall, &mut d, &mut r, &mut s);
        let out = svc.handle_edge(rise, &mut d, &mut r, &mut s);
        rec.shown.extend(d.shown);
        rec.submitted.extend(r.submitted);
        rec.events.extend(s.events);
        out
    }

    #[test]
    fn first_pulse_displays_but_does_not_report() {
        let mut svc = MeterService::new(&cfg());
        let mut rec = Recorder::default();
        let m = pulse(&mut svc, &mut rec, 0).unwrap();
        assert_eq!(m.instant_power_w, 0);
        assert_eq!(rec.shown.len(), 1);
        assert!(rec.submitted.is_empty());

        pulse(&mut svc, &mut rec, 3_600);
        assert_eq!(rec.submitted.len(), 1);
        assert_eq!(rec.submitted[0].instant_power_w, 1_000);
    }

    #[test]
    fn full_hour_saves_and_reports_snapshot() {
        let mut svc = MeterService::new(&cfg());
        let mut rec = Recorder::default();
        pulse(&mut svc, &mut rec, 0);
        pulse(&mut svc, &mut rec, 3_600);

        let (mut d, mut r, mut s) = (Recorder::default(), Recorder::default(), Recorder::default());
        let mut store = FailingStore;
        svc.tick(Some(WallTime::new(10, 0, 5)), &mut d, &mut r, Some(&mut store), &mut s);

        assert_eq!(
            r.submitted,
            vec![Measurement {
                instant_power_w: 1_000,
                energy_day_wh: 2,
                energy_month_wh: 2
            }]
        );
        assert!(s.events.contains(&AppEvent::SaveFailed(PersistenceError::Io(
            std::io::ErrorKind::PermissionDenied
        ))));
        assert_eq!(d.shown.len(), 1);
    }

    #[test]
    fn quiet_tick_touches_nothing() {
        let mut svc = MeterService::new(&cfg());
        let (mut d, mut r, mut s) = (Recorder::default(), Recorder::default(), Recorder::default());
        svc.tick(Some(WallTime::new(10, 17, 5)), &mut d, &mut r, None, &mut s);
        assert!(d.shown.is_empty() && r.submitted.is_empty() && s.events.is_empty());
    }

    #[test]
    fn shutdown_closes_display() {
        struct NoClock;
        impl ClockPort for NoClock {
            fn now(&self) -> Timestamp {
                Timestamp::default()
            }
            fn wall_time(&self) -> Option<WallTime> {
                None
            }
        }

        let mut svc = MeterService::new(&cfg());
        let (mut d, mut r, mut s) = (Recorder::default(), Recorder::default(), Recorder::default());
        let ctl = svc.handle_event(Event::Shutdown, &NoClock, &mut d, &mut r, None, &mut s);
        assert_eq!(ctl, LoopControl::Stop);
        assert!(d.closed);
        assert_eq!(s.events, vec![AppEvent::Stopped]);
    }
}
