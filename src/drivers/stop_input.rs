//! Stop button: the firmware's graceful-termination source.
//!
//! ## Hardware
//!
//! Optional active-low momentary switch with internal pull-up, configured
//! through `counter.stop_input_pin`.  The GPIO fires on the falling edge;
//! the ISR pushes a single [`Event::Shutdown`] and ignores every later
//! press, so contact bounce cannot flood the event queue.
//!
//! The main loop then closes the display, abandons any in-flight report
//! and returns from `main`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::HwSetupError;
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Set by the first press, never cleared.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Queue a shutdown once.  Lock-free, safe from ISR context.
/// Returns whether this call queued the event.
pub fn request_stop() -> bool {
    if STOP_REQUESTED.swap(true, Ordering::AcqRel) {
        return false;
    }
    push_event(Event::Shutdown)
}

pub fn stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::Acquire)
}

/// Configure `pin` as a pulled-up input and attach the press handler.
/// Expects the GPIO ISR service to be installed already.
#[cfg(target_os = "espidf")]
pub fn install(pin: u8) -> Result<(), HwSetupError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: called once from main() after install_isr(), before the loop.
    unsafe {
        let ret = gpio_config(&cfg);
        if ret != ESP_OK as i32 {
            return Err(HwSetupError::GpioConfigFailed(ret));
        }
        let ret = gpio_isr_handler_add(i32::from(pin), Some(stop_isr), core::ptr::null_mut());
        if ret != ESP_OK as i32 {
            return Err(HwSetupError::IsrInstallFailed(ret));
        }
    }
    log::info!("stop_input: GPIO{} armed (press to stop)", pin);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install(pin: u8) -> Result<(), HwSetupError> {
    log::info!("stop_input(sim): GPIO{} not armed, call request_stop()", pin);
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn stop_isr(_arg: *mut core::ffi::c_void) {
    request_stop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_press_queues_shutdown() {
        let _guard = crate::events::GLOBAL_QUEUE_TEST_LOCK.lock().unwrap();
        let q = crate::events::queue();
        q.drain(|_| {});
        assert!(request_stop());
        assert!(!request_stop());
        assert!(stop_requested());

        let mut shutdowns = 0;
        q.drain(|e| {
            if e == Event::Shutdown {
                shutdowns += 1;
            }
        });
        assert_eq!(shutdowns, 1);
    }

    #[test]
    fn install_is_a_no_op_in_sim() {
        assert_eq!(install(0), Ok(()));
    }
}
