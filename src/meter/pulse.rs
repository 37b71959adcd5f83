//! Pulse width validation.
//!
//! The meter's S0 output pulls the input low for a fixed time per unit of
//! energy.  A falling edge opens a [`PulseWindow`], the next rising edge
//! closes it, and the measured width is checked against the reference
//! width from the meter data sheet:
//!
//! ```text
//!   ‾‾‾‾‾‾‾\______________/‾‾‾‾‾‾‾‾
//!          ^ start        ^ end
//!          |<- length  ->|        accepted iff
//!                                  ref*(1-tol) < length < ref*(1+tol)
//! ```
//!
//! With a reference of 0 the first complete pulse becomes the reference.

use core::fmt;

use log::{debug, info, warn};

use crate::clock::Timestamp;

use super::RejectReason;

/// Direction of a level change on the pulse input (active low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// High to low: pulse starts.
    Falling,
    /// Low to high: pulse ends.
    Rising,
}

/// Start/end of the pulse currently being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl PulseWindow {
    pub fn length_ms(&self) -> u64 {
        self.end.millis_since(self.start)
    }
}

/// A pulse whose width fell inside the tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidPulse {
    pub length_ms: u64,
    /// Rising-edge timestamp; the power meter measures from here.
    pub end: Timestamp,
}

/// Edge arrived in the wrong state.  Logged and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseSequenceError {
    /// Falling edge while a pulse is already open.
    FallingWhileActive,
    /// Rising edge with no open pulse.
    RisingWhileIdle,
}

impl fmt::Display for PulseSequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallingWhileActive => write!(f, "starting pulse out of sequence"),
            Self::RisingWhileIdle => write!(f, "ending pulse out of sequence"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    Idle,
    Active { start: Timestamp },
}

/// What a single edge produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Falling edge accepted; pulse window open.
    Started,
    Valid(ValidPulse),
    Rejected(RejectReason),
    OutOfSequence(PulseSequenceError),
}

/// Edge-driven pulse state machine.
#[derive(Debug, Clone)]
pub struct PulseValidator {
    state: PulseState,
    reference_ms: u64,
    tolerance_pct: u8,
}

impl PulseValidator {
    /// `reference_ms == 0` enables learning from the first pulse.
    pub fn new(reference_ms: u32, tolerance_pct: u8) -> Self {
        Self {
            state: PulseState::Idle,
            reference_ms: u64::from(reference_ms),
            tolerance_pct,
        }
    }

    pub fn state(&self) -> PulseState {
        self.state
    }

    pub fn reference_ms(&self) -> u64 {
        self.reference_ms
    }

    pub fn on_edge(&mut self, edge: Edge, at: Timestamp) -> EdgeOutcome {
        match (self.state, edge) {
            (PulseState::Idle, Edge::Falling) => {
                self.state = PulseState::Active { start: at };
                EdgeOutcome::Started
            }
            (PulseState::Active { start }, Edge::Rising) => {
                self.state = PulseState::Idle;
                self.close(PulseWindow { start, end: at })
            }
            (PulseState::Active { .. }, Edge::Falling) => {
                // Keep the original start time.
                warn!("Pulse: {}", PulseSequenceError::FallingWhileActive);
                EdgeOutcome::OutOfSequence(PulseSequenceError::FallingWhileActive)
            }
            (PulseState::Idle, Edge::Rising) => {
                warn!("Pulse: {}", PulseSequenceError::RisingWhileIdle);
                EdgeOutcome::OutOfSequence(PulseSequenceError::RisingWhileIdle)
            }
        }
    }

    fn close(&mut self, window: PulseWindow) -> EdgeOutcome {
        let length_ms = window.length_ms();
        debug!("Pulse: detected pulse with length {} ms", length_ms);

        // A zero-width pulse cannot be a reference; keep learning.
        if self.reference_ms == 0 && length_ms > 0 {
            self.reference_ms = length_ms;
            info!("Pulse: using pulse length {} ms as reference", length_ms);
        }

        if self.within_tolerance(length_ms) {
            EdgeOutcome::Valid(ValidPulse {
                length_ms,
                end: window.end,
            })
        } else {
            warn!(
                "Pulse: length {} ms outside {} ms ±{}%",
                length_ms, self.reference_ms, self.tolerance_pct
            );
            EdgeOutcome::Rejected(RejectReason::OutOfTolerance { length_ms })
        }
    }

    /// Strict open interval `(ref*(100-tol)/100, ref*(100+tol)/100)`,
    /// evaluated on scaled integers so no rounding widens it.
    pub fn within_tolerance(&self, length_ms: u64) -> bool {
        let tol = u64::from(self.tolerance_pct);
        let scaled = length_ms.saturating_mul(100);
        let lower = self.reference_ms.saturating_mul(100u64.saturating_sub(tol));
        let upper = self.reference_ms.saturating_mul(100 + tol);
        scaled > lower && scaled < upper
    }
}
