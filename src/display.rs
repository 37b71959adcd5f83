//! Three-line display formatting.
//!
//! ```text
//!   ┌────────────────────┐
//!   │   Energy Monitor   │   title (row 1)
//!   │Power now: 1234W    │   row 2
//!   │Energy day: 5.6kWh  │   row 3
//!   │Energy mon: 78.9kWh │   row 4
//!   └────────────────────┘
//! ```
//!
//! Formatting is kept apart from the lcdproc client so it can be tested
//! without a socket.

use core::fmt::Write;

use heapless::String;

use crate::meter::Measurement;

/// Capacity of one formatted line.  Wide enough for `u64::MAX` Wh.
pub const LINE_CAP: usize = 48;

pub type Line = String<LINE_CAP>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayLines {
    pub power: Line,
    pub energy_day: Line,
    pub energy_month: Line,
}

impl DisplayLines {
    pub fn from_measurement(m: &Measurement) -> Self {
        let mut lines = Self::default();
        // Capacity covers the widest possible values; writes cannot fail.
        let _ = write!(lines.power, "Power now: {}W", m.instant_power_w);
        let _ = write!(lines.energy_day, "Energy day: {:.1}kWh", kwh(m.energy_day_wh));
        let _ = write!(lines.energy_month, "Energy mon: {:.1}kWh", kwh(m.energy_month_wh));
        lines
    }

    /// Lines in display order (rows 2..=4).
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            self.power.as_str(),
            self.energy_day.as_str(),
            self.energy_month.as_str(),
        ]
        .into_iter()
    }
}

fn kwh(wh: u64) -> f64 {
    wh as f64 / 1000.0
}
