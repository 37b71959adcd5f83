//! Metering engine: pulse validation and power/energy computation.
//!
//! ```text
//!  EdgeEvent ──▶ PulseValidator ──ValidPulse──▶ PowerMeter ──▶ Measurement
//!                     │                             │
//!                     └──── RejectReason ◀──────────┘
//! ```

pub mod power;
pub mod pulse;

use core::fmt;

use serde::{Deserialize, Serialize};

/// Running pulse totals for the current day and month.
///
/// Mutated only by [`power::PowerMeter`] (increment) and the accounting
/// clock (reset to zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    pub pulses_today: u64,
    pub pulses_month: u64,
}

impl Counters {
    pub const fn new(pulses_today: u64, pulses_month: u64) -> Self {
        Self {
            pulses_today,
            pulses_month,
        }
    }

    pub fn increment(&mut self) {
        self.pulses_today = self.pulses_today.saturating_add(1);
        self.pulses_month = self.pulses_month.saturating_add(1);
    }

    pub fn energy_today_wh(&self, wh_per_pulse: u32) -> u64 {
        self.pulses_today.saturating_mul(u64::from(wh_per_pulse))
    }

    pub fn energy_month_wh(&self, wh_per_pulse: u32) -> u64 {
        self.pulses_month.saturating_mul(u64::from(wh_per_pulse))
    }
}

/// Point-in-time reading handed to the display and the report worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub instant_power_w: u32,
    pub energy_day_wh: u64,
    pub energy_month_wh: u64,
}

impl Measurement {
    pub fn snapshot(instant_power_w: u32, counters: &Counters, wh_per_pulse: u32) -> Self {
        Self {
            instant_power_w,
            energy_day_wh: counters.energy_today_wh(wh_per_pulse),
            energy_month_wh: counters.energy_month_wh(wh_per_pulse),
        }
    }
}

/// Why a pulse did not produce a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Pulse width outside the tolerance window.
    OutOfTolerance { length_ms: u64 },
    /// Pulse came too soon after the previous one.
    Glitch { period_ms: u64 },
    /// Computed power at or above the configured maximum.
    Implausible { power_w: u32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfTolerance { length_ms } => {
                write!(f, "pulse length {} ms out of tolerance", length_ms)
            }
            Self::Glitch { period_ms } => write!(f, "glitch, pulse period {} ms", period_ms),
            Self::Implausible { power_w } => write!(f, "implausible power {} W", power_w),
        }
    }
}
