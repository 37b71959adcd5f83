//! Application core: pure domain logic, zero I/O.
//!
//! This module wires the metering engine (pulse validation, power,
//! accounting) behind **port traits** defined in [`ports`], keeping this
//! layer fully testable without GPIO, sockets or flash.

pub mod events;
pub mod ports;
pub mod service;
