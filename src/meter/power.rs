//! Instantaneous power from pulse spacing.
//!
//! One pulse = `wh_per_pulse` Wh, so the average power since the previous
//! pulse is `wh_per_pulse * 3_600_000 / period_ms` W.  Two filters guard the
//! counters:
//!
//! - **Glitch**: period at or below `min_pulse_period_ms` is discarded.
//! - **Implausible**: power at or above `max_power_w` is discarded.
//!
//! Every width-valid pulse moves the reference timestamp, even a rejected
//! one, so a single glitch never turns the next real pulse into an
//! implausibly long period.

use log::{debug, warn};

use crate::clock::Timestamp;
use crate::config::MeterConfig;

use super::pulse::ValidPulse;
use super::{Counters, Measurement, RejectReason};

const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Very first pulse: counted, but no period to measure yet.
    /// Display only.
    First(Measurement),
    /// Counted and measured.  Display and report.
    Measured(Measurement),
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct PowerMeter {
    wh_per_pulse: u32,
    min_pulse_period_ms: u32,
    max_power_w: u32,
    prev: Option<Timestamp>,
    last_power_w: u32,
}

impl PowerMeter {
    pub fn new(wh_per_pulse: u32, min_pulse_period_ms: u32, max_power_w: u32) -> Self {
        Self {
            wh_per_pulse,
            min_pulse_period_ms,
            max_power_w,
            prev: None,
            last_power_w: 0,
        }
    }

    pub fn from_config(cfg: &MeterConfig) -> Self {
        Self::new(cfg.wh_per_pulse, cfg.min_pulse_period_ms, cfg.max_power_w)
    }

    pub fn wh_per_pulse(&self) -> u32 {
        self.wh_per_pulse
    }

    /// Last accepted instantaneous power (0 until the second pulse).
    pub fn last_power_w(&self) -> u32 {
        self.last_power_w
    }

    /// Floored power for a pulse period, saturating at `u32::MAX`.
    pub fn power_for_period(&self, period_ms: u64) -> u32 {
        if period_ms == 0 {
            return u32::MAX;
        }
        let w = u64::from(self.wh_per_pulse).saturating_mul(MS_PER_HOUR) / period_ms;
        u32::try_from(w).unwrap_or(u32::MAX)
    }

    pub fn on_pulse(&mut self, pulse: ValidPulse, counters: &mut Counters) -> PowerOutcome {
        let Some(prev) = self.prev.replace(pulse.end) else {
            counters.increment();
            return PowerOutcome::First(Measurement::snapshot(0, counters, self.wh_per_pulse));
        };

        let period_ms = pulse.end.millis_since(prev);
        if period_ms <= u64::from(self.min_pulse_period_ms) {
            debug!("Power: glitch detected, pulse period {} ms", period_ms);
            return PowerOutcome::Rejected(RejectReason::Glitch { period_ms });
        }

        let power_w = self.power_for_period(period_ms);
        if power_w >= self.max_power_w {
            warn!(
                "Power: {} W exceeds max {} W, ignoring pulse",
                power_w, self.max_power_w
            );
            return PowerOutcome::Rejected(RejectReason::Implausible { power_w });
        }

        counters.increment();
        self.last_power_w = power_w;
        PowerOutcome::Measured(Measurement::snapshot(power_w, counters, self.wh_per_pulse))
    }
}
