//! Time primitives shared by the metering engine.
//!
//! - [`Timestamp`] is a monotonic `(seconds, nanoseconds)` pair captured at
//!   interrupt time.  Interval arithmetic borrows across the sub-second
//!   boundary explicitly, so a nanosecond component that "wraps" between two
//!   readings never produces a bogus interval.
//! - [`WallTime`] is the local calendar view the accounting clock needs:
//!   hour, minute and day of month.

const NANOS_PER_SEC: u32 = 1_000_000_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// Monotonic instant with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: u64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, normalising an oversized nanosecond component.
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs + (nanos / NANOS_PER_SEC) as u64,
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// From a microsecond counter such as `esp_timer_get_time()`.
    pub const fn from_micros(us: u64) -> Self {
        Self {
            secs: us / 1_000_000,
            nanos: ((us % 1_000_000) * 1_000) as u32,
        }
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self {
            secs: ms / 1_000,
            nanos: ((ms % 1_000) as u32) * NANOS_PER_MILLI,
        }
    }

    pub const fn secs(&self) -> u64 {
        self.secs
    }

    pub const fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Whole milliseconds elapsed from `earlier` to `self`.
    ///
    /// Returns 0 when `earlier` is not actually earlier; callers treat a
    /// zero interval like any other too-short interval.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        if *self <= earlier {
            return 0;
        }
        let (secs, nanos) = if self.nanos >= earlier.nanos {
            (self.secs - earlier.secs, self.nanos - earlier.nanos)
        } else {
            // Zero crossing: borrow one second.
            (
                self.secs - earlier.secs - 1,
                NANOS_PER_SEC - earlier.nanos + self.nanos,
            )
        };
        secs.saturating_mul(1_000)
            .saturating_add(u64::from(nanos / NANOS_PER_MILLI))
    }
}

/// Local wall-clock fields relevant to counter rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    /// 0–23
    pub hour: u8,
    /// 0–59
    pub minute: u8,
    /// Day of month, 1–31.
    pub mday: u8,
}

impl WallTime {
    pub const fn new(hour: u8, minute: u8, mday: u8) -> Self {
        Self { hour, minute, mday }
    }

    /// `xx:00`
    pub const fn is_full_hour(&self) -> bool {
        self.minute == 0
    }

    /// `00:00`
    pub const fn is_midnight(&self) -> bool {
        self.hour == 0 && self.minute == 0
    }

    pub const fn is_first_day_of_month(&self) -> bool {
        self.mday == 1
    }
}
