//! Integration tests for the edge → validator → meter → ports pipeline
//! and the tick → accounting → store/report pipeline.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use emon::adapters::background_store::BackgroundStore;
use emon::app::events::AppEvent;
use emon::app::ports::{CounterStore, PersistenceError, SubmitOutcome};
use emon::app::service::{LoopControl, MeterService};
use emon::config::MeterConfig;
use emon::events::Event;
use emon::meter::{Counters, Measurement, RejectReason};

use super::mock_hw::{pulse, LogSink, MemoryStore, MockClock, MockDisplay, MockReports};

struct Rig {
    service: MeterService,
    clock: MockClock,
    display: MockDisplay,
    reports: MockReports,
    store: MemoryStore,
    sink: LogSink,
}

impl Rig {
    fn new(config: &MeterConfig) -> Self {
        let mut rig = Self {
            service: MeterService::new(config),
            clock: MockClock::default(),
            display: MockDisplay::default(),
            reports: MockReports::default(),
            store: MemoryStore::default(),
            sink: LogSink::default(),
        };
        rig.service.start(None, &mut rig.display, &mut rig.sink);
        rig
    }

    fn feed(&mut self, event: Event) -> LoopControl {
        self.service.handle_event(
            event,
            &self.clock,
            &mut self.display,
            &mut self.reports,
            Some(&mut self.store as &mut dyn CounterStore),
            &mut self.sink,
        )
    }

    fn pulse(&mut self, start_ms: u64, length_ms: u64) {
        for e in pulse(start_ms, length_ms) {
            self.feed(e);
        }
    }
}

fn scenario_config() -> MeterConfig {
    MeterConfig {
        wh_per_pulse: 1,
        pulse_length_ms: 100,
        pulse_tolerance_pct: 5,
        min_pulse_period_ms: 200,
        max_power_w: 10_000,
        ..MeterConfig::default()
    }
}

// ── Worked metering scenario ──────────────────────────────────

#[test]
fn metering_scenario_filters_width_glitch_and_implausible_power() {
    let mut rig = Rig::new(&scenario_config());

    // 100 ms pulse: inside [95, 105], counted, display only.
    rig.pulse(0, 100);
    assert_eq!(rig.service.counters(), Counters::new(1, 1));
    assert!(rig.reports.submitted.is_empty());

    // 80 ms pulse: out of tolerance.
    rig.pulse(900, 80);
    assert_eq!(rig.service.counters(), Counters::new(1, 1));
    assert!(rig.sink.events.contains(&AppEvent::PulseRejected(
        RejectReason::OutOfTolerance { length_ms: 80 }
    )));

    // 1000 ms after the first accepted pulse: 3600 W.
    rig.pulse(1_000, 100);
    assert_eq!(rig.service.counters(), Counters::new(2, 2));
    assert_eq!(
        rig.reports.submitted,
        vec![Measurement {
            instant_power_w: 3_600,
            energy_day_wh: 2,
            energy_month_wh: 2,
        }]
    );
    assert_eq!(rig.display.last_power_line(), Some("Power now: 3600W"));

    // 100 ms later: glitch.
    rig.pulse(1_100, 100);
    assert_eq!(rig.service.counters(), Counters::new(2, 2));
    assert!(rig.sink.events.contains(&AppEvent::PulseRejected(
        RejectReason::Glitch { period_ms: 100 }
    )));

    // 300 ms later: 12000 W is implausible.
    rig.pulse(1_400, 100);
    assert_eq!(rig.service.counters(), Counters::new(2, 2));
    assert!(rig.sink.events.contains(&AppEvent::PulseRejected(
        RejectReason::Implausible { power_w: 12_000 }
    )));

    // The rejected pulse still moved the reference: 1000 ms after it.
    rig.pulse(2_400, 100);
    assert_eq!(rig.service.counters(), Counters::new(3, 3));
    assert_eq!(rig.reports.submitted.last().map(|m| m.instant_power_w), Some(3_600));
}

#[test]
fn busy_dispatcher_still_counts_and_displays() {
    let mut rig = Rig::new(&scenario_config());
    rig.reports.busy = true;
    rig.pulse(0, 100);
    rig.pulse(1_000, 100);

    assert_eq!(rig.service.counters(), Counters::new(2, 2));
    assert_eq!(rig.display.last_power_line(), Some("Power now: 3600W"));
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::Measured {
            reported: Some(SubmitOutcome::Busy),
            ..
        }
    )));
}

#[test]
fn rising_edge_without_falling_is_out_of_sequence() {
    let mut rig = Rig::new(&scenario_config());
    let [_, rising] = pulse(0, 100);
    rig.feed(rising);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::OutOfSequence(_))), 1);
    assert_eq!(rig.service.counters(), Counters::default());
}

#[test]
fn reference_width_is_learned_from_first_pulse() {
    let mut rig = Rig::new(&MeterConfig {
        pulse_length_ms: 0,
        ..scenario_config()
    });
    rig.pulse(0, 40);
    assert_eq!(rig.service.reference_pulse_ms(), 40);
    assert_eq!(rig.service.counters(), Counters::new(1, 1));

    rig.pulse(1_000, 60);
    assert_eq!(rig.service.counters(), Counters::new(1, 1));
}

// ── Accounting ────────────────────────────────────────────────

#[test]
fn unsynced_clock_tick_does_nothing() {
    let mut rig = Rig::new(&scenario_config());
    rig.pulse(0, 100);
    let frames = rig.display.frames.len();

    rig.feed(Event::Tick);
    assert!(rig.store.saved.is_empty());
    assert_eq!(rig.display.frames.len(), frames);
}

#[test]
fn full_hour_saves_and_reports_once() {
    let mut rig = Rig::new(&scenario_config());
    rig.pulse(0, 100);
    rig.pulse(1_000, 100);

    rig.clock.set(14, 0, 9);
    rig.feed(Event::Tick);
    rig.feed(Event::Tick);

    assert_eq!(rig.store.saved, vec![Counters::new(2, 2)]);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::HourlyReport { .. })), 1);
    assert_eq!(
        rig.reports.submitted.last(),
        Some(&Measurement {
            instant_power_w: 3_600,
            energy_day_wh: 2,
            energy_month_wh: 2,
        })
    );

    // Next hour fires again once the minute has moved on.
    rig.clock.set(14, 30, 9);
    rig.feed(Event::Tick);
    rig.clock.set(15, 0, 9);
    rig.feed(Event::Tick);
    assert_eq!(rig.store.saved.len(), 2);
}

#[test]
fn midnight_on_first_of_month_resets_both_before_saving() {
    let mut rig = Rig::new(&scenario_config());
    rig.pulse(0, 100);
    rig.pulse(1_000, 100);

    rig.clock.set(0, 0, 1);
    rig.feed(Event::Tick);

    assert_eq!(rig.service.counters(), Counters::default());
    assert!(rig.sink.events.contains(&AppEvent::DailyReset { previous_wh: 2 }));
    assert!(rig.sink.events.contains(&AppEvent::MonthlyReset { previous_wh: 2 }));
    assert_eq!(rig.store.saved, vec![Counters::default()]);
    assert_eq!(rig.display.frames.last().map(|f| f[1].as_str()), Some("Energy day: 0.0kWh"));
}

#[test]
fn midnight_mid_month_keeps_monthly_total() {
    let mut rig = Rig::new(&scenario_config());
    rig.pulse(0, 100);

    rig.clock.set(0, 0, 17);
    rig.feed(Event::Tick);

    assert_eq!(rig.service.counters(), Counters::new(0, 1));
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::MonthlyReset { .. })), 0);
}

#[test]
fn failed_save_is_reported_and_not_fatal() {
    let mut rig = Rig::new(&scenario_config());
    rig.store.fail_with = Some(PersistenceError::Io(std::io::ErrorKind::PermissionDenied));
    rig.clock.set(9, 0, 3);

    assert_eq!(rig.feed(Event::Tick), LoopControl::Continue);
    assert!(rig.sink.events.contains(&AppEvent::SaveFailed(PersistenceError::Io(
        std::io::ErrorKind::PermissionDenied
    ))));
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::HourlyReport { .. })), 1);
}

/// Flash that takes `delay` per write.
struct SlowFlash {
    delay: Duration,
    written: Arc<Mutex<Vec<Counters>>>,
}

impl CounterStore for SlowFlash {
    fn load(&self) -> Result<Option<Counters>, PersistenceError> {
        Ok(None)
    }
    fn save(&mut self, c: &Counters) -> Result<(), PersistenceError> {
        std::thread::sleep(self.delay);
        self.written.lock().unwrap().push(*c);
        Ok(())
    }
}

#[test]
fn slow_flash_does_not_hold_up_edges() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let flash = SlowFlash {
        delay: Duration::from_millis(400),
        written: Arc::clone(&written),
    };
    let mut store = BackgroundStore::spawn(flash, None).unwrap();
    let mut rig = Rig::new(&scenario_config());
    rig.clock.set(14, 0, 9);

    let started = Instant::now();
    rig.service.handle_event(
        Event::Tick,
        &rig.clock,
        &mut rig.display,
        &mut rig.reports,
        Some(&mut store as &mut dyn CounterStore),
        &mut rig.sink,
    );
    rig.pulse(0, 100);
    rig.pulse(1_000, 100);
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(rig.service.counters(), Counters::new(2, 2));
    assert!(rig.sink.events.contains(&AppEvent::CountersSaved(Counters::default())));

    // The write still lands once the worker gets to it.
    let waiting = Instant::now();
    while store.is_pending() {
        assert!(waiting.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(written.lock().unwrap().as_slice(), [Counters::default()]);
}

#[test]
fn restored_counters_continue_counting() {
    let config = scenario_config();
    let mut store = MemoryStore::default();
    store.saved.push(Counters::new(10, 240));

    let mut service = MeterService::new(&config);
    let mut display = MockDisplay::default();
    let mut sink = LogSink::default();
    service.start(store.load().unwrap(), &mut display, &mut sink);

    assert_eq!(sink.events[0], AppEvent::Started(Counters::new(10, 240)));
    assert_eq!(display.frames[0][2], "Energy mon: 0.2kWh");
}

#[test]
fn shutdown_closes_display_and_stops() {
    let mut rig = Rig::new(&scenario_config());
    assert_eq!(rig.feed(Event::Shutdown), LoopControl::Stop);
    assert!(rig.display.closed);
    assert_eq!(rig.sink.events.last(), Some(&AppEvent::Stopped));
}
