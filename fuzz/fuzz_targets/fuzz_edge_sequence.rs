//! Fuzz target: edge stream through the metering service
//!
//! Each input byte becomes one edge: bit 7 selects rising/falling, the
//! low bits are the gap since the previous edge in 10 ms steps.  Checks:
//! - No panics or overflow on arbitrary edge orderings
//! - Daily and monthly counters stay equal (no tick is fed)
//! - Every counted pulse moves the counters by exactly one
//!
//! cargo fuzz run fuzz_edge_sequence

#![no_main]

use emon::app::events::AppEvent;
use emon::app::ports::{DisplayPort, EventSink, ReportPort, SubmitOutcome};
use emon::app::service::MeterService;
use emon::clock::Timestamp;
use emon::config::MeterConfig;
use emon::display::DisplayLines;
use emon::events::EdgeEvent;
use emon::meter::pulse::Edge;
use emon::meter::Measurement;
use libfuzzer_sys::fuzz_target;

struct Null;

impl DisplayPort for Null {
    fn show(&mut self, _lines: &DisplayLines) {}
    fn close(&mut self) {}
}

impl ReportPort for Null {
    fn submit(&mut self, _m: Measurement) -> SubmitOutcome {
        SubmitOutcome::Accepted
    }
}

impl EventSink for Null {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Some((&reference, edges)) = data.split_first() else {
        return;
    };
    let cfg = MeterConfig {
        pulse_length_ms: u32::from(reference),
        ..MeterConfig::default()
    };
    let mut service = MeterService::new(&cfg);
    let (mut display, mut reports, mut sink) = (Null, Null, Null);

    let mut t_ms = 0u64;
    for &b in edges {
        t_ms += u64::from(b & 0x7F) * 10;
        let edge = if b & 0x80 != 0 { Edge::Rising } else { Edge::Falling };
        let before = service.counters();
        let counted = service.handle_edge(
            EdgeEvent { edge, at: Timestamp::from_millis(t_ms) },
            &mut display,
            &mut reports,
            &mut sink,
        );
        let after = service.counters();
        assert_eq!(after.pulses_today, after.pulses_month);
        let expected = before.pulses_today + u64::from(counted.is_some());
        assert_eq!(after.pulses_today, expected);
    }
});
