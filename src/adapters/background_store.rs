//! Counter store that writes on its own thread.
//!
//! The main loop must not wait on flash.  [`BackgroundStore`] implements
//! [`CounterStore`] by handing the record to a store worker and returning
//! at once:
//!
//! ```text
//!  main loop                          store worker thread
//!  ─────────                          ───────────────────
//!  save(c) ── mailbox.signal(c) ────▶ mailbox.wait()
//!    last failure? ──▶ Err(e)         inner.save(c)   (flash I/O)
//!    else          ──▶ Ok(())         failure ──▶ last_error
//! ```
//!
//! The mailbox holds one record; a newer save replaces one not yet written.
//! A failed write surfaces as the result of the next `save` call.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::app::ports::{CounterStore, PersistenceError};
use crate::drivers::task_pin::{self, Core};
use crate::meter::Counters;

/// Record plus its save sequence number.
type Mailbox = Signal<CriticalSectionRawMutex, (u32, Counters)>;
type LastError = Mutex<CriticalSectionRawMutex, Cell<Option<PersistenceError>>>;

struct Shared {
    mailbox: Mailbox,
    last_error: LastError,
    /// Sequence number of the last record written (or failed).
    written: AtomicU32,
}

pub struct BackgroundStore {
    shared: Arc<Shared>,
    latest: Option<Counters>,
    queued: u32,
}

impl BackgroundStore {
    /// Move `inner` onto a store worker thread (Core 0).  `restored` is the
    /// record loaded at startup, returned by [`CounterStore::load`] until
    /// the first save.
    pub fn spawn<S>(inner: S, restored: Option<Counters>) -> std::io::Result<Self>
    where
        S: CounterStore + Send + 'static,
    {
        let shared = Arc::new(Shared {
            mailbox: Signal::new(),
            last_error: Mutex::new(Cell::new(None)),
            written: AtomicU32::new(0),
        });
        let worker = Arc::clone(&shared);
        task_pin::spawn_on_core(Core::Pro, 4, 6, "store\0", move || {
            run_store_worker(inner, &worker);
        })?;
        Ok(Self {
            shared,
            latest: restored,
            queued: 0,
        })
    }

    /// A record is waiting for, or being written by, the worker.
    pub fn is_pending(&self) -> bool {
        self.shared.written.load(Ordering::Acquire) != self.queued
    }
}

impl CounterStore for BackgroundStore {
    /// The most recent record handed to the store.
    fn load(&self) -> Result<Option<Counters>, PersistenceError> {
        Ok(self.latest)
    }

    fn save(&mut self, counters: &Counters) -> Result<(), PersistenceError> {
        self.latest = Some(*counters);
        self.queued = self.queued.wrapping_add(1);
        self.shared.mailbox.signal((self.queued, *counters));
        match self.shared.last_error.lock(|e| e.take()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn run_store_worker<S: CounterStore>(mut inner: S, shared: &Shared) {
    info!("Store worker started");
    loop {
        let (seq, counters) = futures_lite::future::block_on(shared.mailbox.wait());
        match inner.save(&counters) {
            Ok(()) => debug!("Store worker: record written"),
            Err(e) => {
                warn!("Store worker: write failed: {}", e);
                shared.last_error.lock(|cell| cell.set(Some(e)));
            }
        }
        shared.written.store(seq, Ordering::Release);
    }
}
