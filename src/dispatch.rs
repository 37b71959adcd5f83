//! Rate-limited, non-blocking report dispatch.
//!
//! The main loop must never wait on the network.  A single
//! [`DispatchSlot`] gates hand-off to a report worker running on its own
//! core-pinned thread:
//!
//! ```text
//!  main loop                         report worker thread
//!  ─────────                         ────────────────────
//!  submit(m)                         ┌─────────────────────────────┐
//!    slot Idle?  ──yes──▶ InFlight   │ mailbox.wait().await        │
//!      mailbox.signal(m) ──────────▶ │ send_report(m)   (≤ 20 s)   │
//!      → Accepted                    │ Timer::after(rate - elapsed)│
//!    slot InFlight ──▶ Busy (drop)   │ slot.release()              │
//!                                    └─────────────────────────────┘
//! ```
//!
//! The slot is an atomic flag acquired by the main loop and released by the
//! worker, so at most one report is in flight and consecutive reports are
//! at least `api_update_rate` apart.  Failed reports are not retried; the
//! next submission carries fresh totals anyway.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::app::ports::{ReportPort, SubmitOutcome, TelemetryPort, TransportError};
use crate::drivers::task_pin::{self, Core};
use crate::meter::Measurement;
use crate::telemetry::{self, ReportTarget};

type Mailbox = Signal<CriticalSectionRawMutex, Measurement>;

// ── DispatchSlot ─────────────────────────────────────────────

/// Single-occupancy flag: `false` = Idle, `true` = InFlight.
#[derive(Debug, Default)]
pub struct DispatchSlot {
    in_flight: AtomicBool,
}

impl DispatchSlot {
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Idle → InFlight.  Returns `false` if already in flight.
    pub fn try_acquire(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// InFlight → Idle.
    pub fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

// ── ReportDispatcher (main-loop side) ────────────────────────

/// Main-loop handle.  Cheap to clone; all clones share one slot.
#[derive(Clone)]
pub struct ReportDispatcher {
    slot: Arc<DispatchSlot>,
    mailbox: Arc<Mailbox>,
}

impl Default for ReportDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDispatcher {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(DispatchSlot::new()),
            mailbox: Arc::new(Signal::new()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.slot.is_in_flight()
    }

    /// Worker bound to this dispatcher's slot and mailbox.
    pub fn worker<T: TelemetryPort>(
        &self,
        transport: T,
        target: ReportTarget,
        update_rate: Duration,
    ) -> ReportWorker<T> {
        ReportWorker {
            slot: Arc::clone(&self.slot),
            mailbox: Arc::clone(&self.mailbox),
            transport,
            target,
            update_rate,
        }
    }

    /// Start the report worker on its own thread (Core 0, next to lwIP).
    ///
    /// The transport is built on the worker thread, so it need not be `Send`.
    pub fn spawn_worker<T, F>(
        &self,
        make_transport: F,
        target: ReportTarget,
        update_rate: Duration,
    ) -> std::io::Result<std::thread::JoinHandle<()>>
    where
        T: TelemetryPort,
        F: FnOnce() -> T + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let mailbox = Arc::clone(&self.mailbox);
        task_pin::spawn_on_core(Core::Pro, 5, 12, "report\0", move || {
            let worker = ReportWorker {
                slot,
                mailbox,
                transport: make_transport(),
                target,
                update_rate,
            };
            run_worker_loop(worker);
        })
    }
}

impl ReportPort for ReportDispatcher {
    fn submit(&mut self, measurement: Measurement) -> SubmitOutcome {
        if self.slot.try_acquire() {
            self.mailbox.signal(measurement);
            SubmitOutcome::Accepted
        } else {
            SubmitOutcome::Busy
        }
    }
}

// ── ReportWorker (worker-thread side) ────────────────────────

pub struct ReportWorker<T: TelemetryPort> {
    slot: Arc<DispatchSlot>,
    mailbox: Arc<Mailbox>,
    transport: T,
    target: ReportTarget,
    update_rate: Duration,
}

/// Remaining hold time after a transmission that took `elapsed`.
pub fn hold_time(update_rate: Duration, elapsed: Duration) -> Duration {
    update_rate.saturating_sub(elapsed)
}

impl<T: TelemetryPort> ReportWorker<T> {
    /// Send one measurement.  Blocking; worker thread only.
    pub fn transmit(&mut self, m: &Measurement) -> Result<(), TransportError> {
        let result = telemetry::send_report(&mut self.transport, &self.target, m);
        match result {
            Ok(()) => info!(
                "Report: sent P={}W day={}Wh month={}Wh",
                m.instant_power_w, m.energy_day_wh, m.energy_month_wh
            ),
            Err(TransportError::MissingApiKey) => warn!("Report: no API key configured, not sent"),
            Err(e) => warn!("Report: failed: {}", e),
        }
        result
    }

    /// Wait for one submission, transmit it, hold the slot for the rest of
    /// the update interval, then release it.
    pub async fn serve_one(&mut self) -> Result<(), TransportError> {
        let m = self.mailbox.wait().await;
        let started = Instant::now();
        let result = self.transmit(&m);

        let hold = hold_time(self.update_rate, started.elapsed());
        if !hold.is_zero() {
            async_io_mini::Timer::after(hold).await;
        }
        self.slot.release();
        result
    }

    pub async fn run(mut self) {
        info!(
            "Report worker started (min interval {}s)",
            self.update_rate.as_secs()
        );
        let mut failures: u32 = 0;
        loop {
            match self.serve_one().await {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    debug!("Report worker: {} failed report(s) in a row, last: {}", failures, e);
                }
            }
        }
    }
}

fn run_worker_loop<T: TelemetryPort>(worker: ReportWorker<T>) {
    let executor: edge_executor::LocalExecutor<'_, 2> = edge_executor::LocalExecutor::new();
    futures_lite::future::block_on(executor.run(worker.run()));
}
