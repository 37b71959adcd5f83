//! Pulse input: GPIO with pull-up, interrupt on both edges.
//!
//! The meter's S0 output pulls the line low for the duration of a pulse,
//! so a falling edge starts a pulse and a rising edge ends it.  The ISR
//! does nothing but stamp the edge with the monotonic clock and push it
//! onto the event queue; validation happens in the main loop.
//!
//! ```text
//!   idle ─────┐         ┌───────────── idle (high)
//!             │ pulse   │
//!             └─────────┘
//!          Falling    Rising
//! ```

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin};
use log::warn;

use crate::clock::Timestamp;
use crate::error::HwSetupError;
use crate::events::{push_event, EdgeEvent, Event};
use crate::meter::pulse::Edge;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Line level to edge: a line that just went low saw a falling edge.
pub fn edge_from_level(high: bool) -> Edge {
    if high { Edge::Rising } else { Edge::Falling }
}

/// Queue one edge observed at `at`.  Shared by the ISR and the simulation.
pub fn record_edge(high: bool, at: Timestamp) {
    push_event(Event::Edge(EdgeEvent {
        edge: edge_from_level(high),
        at,
    }));
}

/// Warn if the line is not idle (high) at startup: a pulse in progress
/// would otherwise surface as an out-of-sequence rising edge.
pub fn check_idle_level(pin: &mut impl InputPin) -> bool {
    let idle = pin.is_high().unwrap_or(true);
    if !idle {
        warn!("pulse_input: line is low at startup, first edge will be out of sequence");
    }
    idle
}

// ── RawGpioInput ──────────────────────────────────────────────

/// Input pin read straight from the GPIO register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawGpioInput(pub i32);

impl ErrorType for RawGpioInput {
    type Error = Infallible;
}

impl InputPin for RawGpioInput {
    #[cfg(target_os = "espidf")]
    fn is_high(&mut self) -> Result<bool, Infallible> {
        // SAFETY: read-only register access on a configured input.
        Ok(unsafe { gpio_get_level(self.0) } != 0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|h| !h)
    }
}

// ── Setup ─────────────────────────────────────────────────────

/// Configure `pin` as a pulled-up input interrupting on any edge.
#[cfg(target_os = "espidf")]
pub fn configure(pin: u8) -> Result<(), HwSetupError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
    };
    // SAFETY: called once from main() before the event loop.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwSetupError::GpioConfigFailed(ret));
    }
    log::info!("pulse_input: GPIO{} configured (pull-up, any edge)", pin);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn configure(pin: u8) -> Result<(), HwSetupError> {
    log::info!("pulse_input(sim): GPIO{} configure skipped", pin);
    Ok(())
}

/// Install the GPIO ISR service and attach the edge handler to `pin`.
#[cfg(target_os = "espidf")]
pub fn install_isr(pin: u8) -> Result<(), HwSetupError> {
    // SAFETY: single-threaded init path.  ESP_ERR_INVALID_STATE means the
    // service is already installed, which is fine.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwSetupError::IsrInstallFailed(ret));
        }
        let ret = gpio_isr_handler_add(
            i32::from(pin),
            Some(pulse_edge_isr),
            usize::from(pin) as *mut core::ffi::c_void,
        );
        if ret != ESP_OK as i32 {
            return Err(HwSetupError::IsrInstallFailed(ret));
        }
    }
    log::info!("pulse_input: ISR attached to GPIO{}", pin);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install_isr(pin: u8) -> Result<(), HwSetupError> {
    log::info!("pulse_input(sim): ISR for GPIO{} not installed", pin);
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn pulse_edge_isr(arg: *mut core::ffi::c_void) {
    let pin = arg as usize as i32;
    // SAFETY: both calls are ISR-safe register reads.
    let (level, now_us) = unsafe { (gpio_get_level(pin), esp_timer_get_time()) };
    record_edge(level != 0, Timestamp::from_micros(now_us.max(0) as u64));
}

/// Host stand-in for a meter: queue one pulse of `length_ms` starting at `start`.
#[cfg(not(target_os = "espidf"))]
pub fn simulate_pulse(start: Timestamp, length_ms: u64) {
    record_edge(false, start);
    let end = Timestamp::from_millis(start_millis(start) + length_ms);
    record_edge(true, end);
}

#[cfg(not(target_os = "espidf"))]
fn start_millis(t: Timestamp) -> u64 {
    t.secs() * 1000 + u64::from(t.subsec_nanos() / 1_000_000)
}
