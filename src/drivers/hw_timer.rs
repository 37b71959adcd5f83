//! Accounting tick timer using ESP-IDF's esp_timer API.
//!
//! A one-shot timer that re-arms itself from its own callback, pushing
//! [`Event::Tick`] each time it fires.  Re-arming from the callback keeps
//! ticks from piling up if the main loop stalls.  On simulation targets a
//! sleeper thread pushes the ticks instead.
//!
//! Timer callbacks execute in the ESP timer task context (not ISR), so
//! they can safely call push_event().

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;

use crate::error::HwSetupError;
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

static PERIOD_US: AtomicU64 = AtomicU64::new(30_000_000);
static RUNNING: AtomicBool = AtomicBool::new(false);

pub fn period() -> Duration {
    Duration::from_micros(PERIOD_US.load(Ordering::Relaxed))
}

#[cfg(target_os = "espidf")]
static mut TICK_TIMER: esp_timer_handle_t = core::ptr::null_mut();

/// SAFETY: TICK_TIMER is written once in `start_tick_timer()` before the
/// first callback fires and never again.
#[cfg(target_os = "espidf")]
unsafe fn tick_timer() -> esp_timer_handle_t {
    unsafe { TICK_TIMER }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tick_cb(_arg: *mut core::ffi::c_void) {
    if RUNNING.load(Ordering::Acquire) {
        // SAFETY: tick_timer() contract; the handle is valid once armed.
        let ret = unsafe { esp_timer_start_once(tick_timer(), PERIOD_US.load(Ordering::Relaxed)) };
        if ret != ESP_OK {
            log::error!("hw_timer: re-arm failed (rc={}), ticks stopped", ret);
        }
    }
    push_event(Event::Tick);
}

/// Create and arm the tick timer.
#[cfg(target_os = "espidf")]
pub fn start_tick_timer(period: Duration) -> Result<(), HwSetupError> {
    PERIOD_US.store(period.as_micros() as u64, Ordering::Relaxed);
    RUNNING.store(true, Ordering::Release);
    // SAFETY: TICK_TIMER is written here once at boot from the main task
    // before the timer is armed.
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"tick\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut TICK_TIMER);
        if ret != ESP_OK {
            RUNNING.store(false, Ordering::Release);
            return Err(HwSetupError::TimerSetupFailed(ret));
        }
        let ret = esp_timer_start_once(tick_timer(), PERIOD_US.load(Ordering::Relaxed));
        if ret != ESP_OK {
            RUNNING.store(false, Ordering::Release);
            return Err(HwSetupError::TimerSetupFailed(ret));
        }
    }
    log::info!("hw_timer: tick every {}s", period.as_secs());
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn start_tick_timer(period: Duration) -> Result<(), HwSetupError> {
    PERIOD_US.store(period.as_micros() as u64, Ordering::Relaxed);
    if RUNNING.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    std::thread::Builder::new()
        .name("tick".into())
        .spawn(|| {
            while RUNNING.load(Ordering::Acquire) {
                std::thread::sleep(self::period());
                if RUNNING.load(Ordering::Acquire) {
                    push_event(Event::Tick);
                }
            }
        })
        .map_err(|e| HwSetupError::TimerSetupFailed(e.raw_os_error().unwrap_or(-1)))?;
    log::info!("hw_timer(sim): tick every {}s", period.as_secs());
    Ok(())
}

/// Stop re-arming.  A tick already in flight may still be delivered.
pub fn stop_tick_timer() {
    RUNNING.store(false, Ordering::Release);
    #[cfg(target_os = "espidf")]
    // SAFETY: null-check guards a timer that was never created.
    unsafe {
        let t = tick_timer();
        if !t.is_null() {
            esp_timer_stop(t);
        }
    }
}

pub fn is_running() -> bool {
    RUNNING.load(Ordering::Acquire)
}
