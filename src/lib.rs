//! Pulse-counting energy monitor firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod accounting;
pub mod app;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod events;
pub mod meter;
pub mod telemetry;

pub mod adapters;
pub mod drivers;
