//! Counter file adapter.
//!
//! Implements [`CounterStore`] on the flash filesystem.  The record is
//! `emond.dat` in the configured directory, two ASCII lines:
//!
//! ```text
//! <pulses_today>\n
//! <pulses_month>\n
//! ```
//!
//! Writes go to a sibling temp file which is synced and renamed over the
//! record, so a power cut mid-write leaves the previous record intact.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::app::ports::{CounterStore, PersistenceError};
use crate::meter::Counters;

/// Record file name inside the storage directory.
pub const COUNTER_FILE: &str = "emond.dat";

pub struct FileCounterStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileCounterStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(COUNTER_FILE),
            tmp_path: dir.join(format!("{}.tmp", COUNTER_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse the two-line record.
pub fn parse_record(text: &str) -> Result<Counters, PersistenceError> {
    let mut lines = text.lines();
    let mut next = |line: u8| -> Result<u64, PersistenceError> {
        let raw = lines.next().ok_or(PersistenceError::Truncated)?;
        raw.trim()
            .parse()
            .map_err(|_| PersistenceError::Malformed { line })
    };
    let pulses_today = next(1)?;
    let pulses_month = next(2)?;
    Ok(Counters::new(pulses_today, pulses_month))
}

pub fn format_record(counters: &Counters) -> String {
    format!("{}\n{}\n", counters.pulses_today, counters.pulses_month)
}

impl CounterStore for FileCounterStore {
    fn load(&self) -> Result<Option<Counters>, PersistenceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Store: data file {} not yet created", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let counters = parse_record(&text)?;
        info!(
            "Store: loaded daily counter {}, monthly counter {}",
            counters.pulses_today, counters.pulses_month
        );
        Ok(Some(counters))
    }

    fn save(&mut self, counters: &Counters) -> Result<(), PersistenceError> {
        let mut file = File::create(&self.tmp_path)?;
        file.write_all(format_record(counters).as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.path)?;
        debug!(
            "Store: saved daily counter {}, monthly counter {}",
            counters.pulses_today, counters.pulses_month
        );
        Ok(())
    }
}
