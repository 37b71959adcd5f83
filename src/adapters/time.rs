//! ESP32 time adapter.
//!
//! Implements [`ClockPort`].
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`
//!   (microsecond precision); local wall time from `gettimeofday` +
//!   `localtime_r`, using the TZ set at boot.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation; wall time is never synced.

use crate::app::ports::ClockPort;
use crate::clock::{Timestamp, WallTime};

/// Anything before 2020-01-01 means SNTP has not set the clock yet.
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

/// Time adapter for the ESP32-S3 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    #[cfg(target_os = "espidf")]
    fn local_time() -> Option<WallTime> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        if (tv.tv_sec as i64) < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        if !(0..=23).contains(&tm.tm_hour)
            || !(0..=59).contains(&tm.tm_min)
            || !(1..=31).contains(&tm.tm_mday)
        {
            return None;
        }
        Some(WallTime::new(tm.tm_hour as u8, tm.tm_min as u8, tm.tm_mday as u8))
    }

    #[cfg(not(target_os = "espidf"))]
    fn local_time() -> Option<WallTime> {
        None
    }
}

impl ClockPort for Esp32TimeAdapter {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.uptime_us())
    }

    fn wall_time(&self) -> Option<WallTime> {
        Self::local_time()
    }
}
