//! Wall-clock aligned counter accounting.
//!
//! Driven by the periodic tick (nominally every 30 s).  Each tick looks at
//! local wall time and fires at most once per eligible minute:
//!
//! - **00:00**: zero the daily counter; on day 1 also zero the monthly one.
//! - **xx:00**: hourly housekeeping (counter save, hourly report).
//!
//! A one-shot flag per event suppresses repeats while the clock stays in
//! the same minute and re-arms once the minute has passed.  This relies on
//! the tick period being at most one minute.
//!
//! The clock mutates [`Counters`] itself (resets only) and reports what
//! happened to an [`AccountingDelegate`], which decides what to do with it
//! (persist, report, refresh display).  Resets are applied before the
//! hourly callback, so a midnight save persists the fresh zeroes.
//!
//! ```text
//!   Tick ──▶ AccountingClock.tick(wall, counters)
//!                 │
//!                 ├──▶ delegate.on_accounting(DailyReset { .. })
//!                 ├──▶ delegate.on_accounting(MonthlyReset { .. })
//!                 └──▶ delegate.on_accounting(FullHour)
//! ```

use log::info;

use crate::app::ports::{AccountingDelegate, AccountingFired};
use crate::clock::WallTime;
use crate::meter::Counters;

#[derive(Debug, Default)]
pub struct AccountingClock {
    reset_done: bool,
    save_done: bool,
}

impl AccountingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one tick.
    ///
    /// `wall` is `None` while local time is unknown (before time sync); such
    /// ticks do nothing and leave the flags untouched.
    pub fn tick(
        &mut self,
        wall: Option<WallTime>,
        counters: &mut Counters,
        delegate: &mut dyn AccountingDelegate,
    ) {
        let Some(now) = wall else {
            return;
        };

        if now.is_midnight() {
            if !self.reset_done {
                self.reset_done = true;

                let previous = counters.pulses_today;
                info!("Accounting: resetting daily counter (current value {})", previous);
                counters.pulses_today = 0;
                delegate.on_accounting(AccountingFired::DailyReset { previous }, counters);

                if now.is_first_day_of_month() {
                    let previous = counters.pulses_month;
                    info!(
                        "Accounting: resetting monthly counter (current value {})",
                        previous
                    );
                    counters.pulses_month = 0;
                    delegate.on_accounting(AccountingFired::MonthlyReset { previous }, counters);
                }
            }
        } else {
            self.reset_done = false;
        }

        if now.is_full_hour() {
            if !self.save_done {
                self.save_done = true;
                delegate.on_accounting(AccountingFired::FullHour, counters);
            }
        } else {
            self.save_done = false;
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Test delegate that records fire events with the counters seen.
    struct RecordingDelegate {
        fires: Vec<(AccountingFired, Counters)>,
    }

    impl RecordingDelegate {
        fn new() -> Self {
            Self { fires: Vec::new() }
        }
    }

    impl AccountingDelegate for RecordingDelegate {
        fn on_accounting(&mut self, fired: AccountingFired, counters: &Counters) {
            self.fires.push((fired, *counters));
        }
    }

    fn at(hour: u8, minute: u8, mday: u8) -> Option<WallTime> {
        Some(WallTime::new(hour, minute, mday))
    }

    #[test]
    fn midnight_resets_daily_once() {
        let mut clock = AccountingClock::new();
        let mut delegate = RecordingDelegate::new();
        let mut c = Counters::new(500, 9_000);

        clock.tick(at(0, 0, 15), &mut c, &mut delegate);
        assert_eq!(c, Counters::new(0, 9_000));

        c.increment();
        // Second tick in the same minute: no second reset.
        clock.tick(at(0, 0, 15), &mut c, &mut delegate);
        assert_eq!(c, Counters::new(1, 9_001));

        let resets: Vec<_> = delegate
            .fires
            .iter()
            .filter(|(f, _)| matches!(f, AccountingFired::DailyReset { .. }))
            .collect();
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].0, AccountingFired::DailyReset { previous: 500 });
    }

    #[test]
    fn first_of_month_resets_both() {
        let mut clock = AccountingClock::new();
        let mut delegate = RecordingDelegate::new();
        let mut c = Counters::new(500, 9_000);

        clock.tick(at(0, 0, 1), &mut c, &mut delegate);
        assert_eq!(c, Counters::default());
        assert_eq!(
            delegate.fires.iter().map(|(f, _)| *f).collect::<Vec<_>>(),
            vec![
                AccountingFired::DailyReset { previous: 500 },
                AccountingFired::MonthlyReset { previous: 9_000 },
                AccountingFired::FullHour,
            ]
        );
        // The hourly callback sees the counters after the reset.
        assert_eq!(delegate.fires[2].1, Counters::default());
    }

    #[test]
    fn flags_rearm_after_leaving_the_minute() {
        let mut clock = AccountingClock::new();
        let mut delegate = RecordingDelegate::new();
        let mut c = Counters::new(10, 10);

        clock.tick(at(0, 0, 2), &mut c, &mut delegate);
        clock.tick(at(0, 1, 2), &mut c, &mut delegate);
        c.increment();
        // Next day.
        clock.tick(at(0, 0, 3), &mut c, &mut delegate);
        assert_eq!(c.pulses_today, 0);

        let daily = delegate
            .fires
            .iter()
            .filter(|(f, _)| matches!(f, AccountingFired::DailyReset { .. }))
            .count();
        assert_eq!(daily, 2);
    }

    #[test]
    fn full_hour_fires_once_per_hour() {
        let mut clock = AccountingClock::new();
        let mut delegate = RecordingDelegate::new();
        let mut c = Counters::new(3, 4);

        // 30 s ticks across 14:59 .. 15:01.
        for (h, m) in [(14, 59), (14, 59), (15, 0), (15, 0), (15, 1), (15, 1)] {
            clock.tick(at(h, m, 20), &mut c, &mut delegate);
        }
        assert_eq!(delegate.fires.len(), 1);
        assert_eq!(delegate.fires[0], (AccountingFired::FullHour, Counters::new(3, 4)));
    }

    #[test]
    fn unsynced_clock_does_nothing() {
        let mut clock = AccountingClock::new();
        let mut delegate = RecordingDelegate::new();
        let mut c = Counters::new(3, 4);

        for _ in 0..10 {
            clock.tick(None, &mut c, &mut delegate);
        }
        assert!(delegate.fires.is_empty());
        assert_eq!(c, Counters::new(3, 4));
    }
}
