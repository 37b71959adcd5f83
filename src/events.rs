//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - the GPIO ISR on the pulse input (one event per edge)
//! - the GPIO ISR on the optional shutdown input
//! - the accounting tick timer callback
//!
//! Events are consumed by the main loop, which is the only code allowed to
//! touch counters, validator state and accounting flags.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│              │     │              │
//! │ Tick timer  │────▶│  EventQueue  │────▶│  Main Loop   │
//! │ Stop button │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Producers never block and never wake anything: a push is a CAS on the
//! ring and nothing else, so it is safe from ISR context.  The consumer
//! polls the ring every [`POLL_INTERVAL`].  Edges carry the timestamp taken
//! in the ISR, so poll latency does not affect measurements.
//!
//! A full queue drops the event and bumps a counter that the consumer
//! reports on its next pass.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use heapless::mpmc::MpMcQueue;

use crate::clock::Timestamp;
use crate::meter::pulse::Edge;

/// Maximum number of pending events.  Power of 2 for the ring.
pub const EVENT_QUEUE_CAP: usize = 32;

/// How long the consumer sleeps when the queue is empty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A level change on the pulse input, stamped in the ISR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub edge: Edge,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // ── Pulse input ───────────────────────────────────────
    Edge(EdgeEvent),

    // ── Timers ────────────────────────────────────────────
    /// Accounting tick (nominally every 30 s).
    Tick,

    // ── Lifecycle ─────────────────────────────────────────
    /// Stop button pressed: close collaborators and leave the main loop.
    Shutdown,
}

/// Bounded multi-producer, single-consumer event queue.
pub struct EventQueue {
    ring: MpMcQueue<Event, EVENT_QUEUE_CAP>,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            ring: MpMcQueue::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue without blocking or waking.  Safe from ISR and timer context.
    /// Returns `false` if the queue was full and the event was dropped.
    pub fn push(&self, event: Event) -> bool {
        if self.ring.enqueue(event).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn pop(&self) -> Option<Event> {
        self.ring.dequeue()
    }

    /// Block the calling thread until an event arrives, polling every
    /// [`POLL_INTERVAL`].  Consumer side only.
    pub fn wait(&self) -> Event {
        loop {
            if let Some(event) = self.pop() {
                return event;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Process every pending event in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    /// Events dropped since the last call, resetting the count.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Global queue ──────────────────────────────────────────────
//
// ISR and timer callbacks have no context pointer to our state, so the
// firmware's queue lives in a static.

static EVENTS: EventQueue = EventQueue::new();

/// The firmware-wide queue shared by the ISR, the timer and the main loop.
pub fn queue() -> &'static EventQueue {
    &EVENTS
}

/// Serialises unit tests that push into or drain the global queue.
#[cfg(test)]
pub(crate) static GLOBAL_QUEUE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Push into the global queue.  Lock-free, safe to call from ISR context.
pub fn push_event(event: Event) -> bool {
    EVENTS.push(event)
}
