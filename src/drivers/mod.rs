//! Hardware drivers: pulse input, stop button, tick timer, platform init,
//! thread pinning.

pub mod hw_init;
pub mod hw_timer;
pub mod pulse_input;
pub mod stop_input;
pub mod task_pin;
