//! Unified error types for the energy monitor firmware.
//!
//! Every subsystem has its own small `Copy` error enum; all of them convert
//! into the top-level [`Error`] so the startup path and the event loop can
//! handle failures uniformly.  Only startup failures are fatal; they map to
//! a distinct process exit code through [`StartupError::exit_code`].

use core::fmt;

pub use crate::app::ports::{PersistenceError, TransportError};
pub use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration could not be loaded or failed validation.
    Config(ConfigError),
    /// GPIO, interrupt or timer setup failed.
    HardwareSetup(HwSetupError),
    /// Counter file could not be read or written.
    Persistence(PersistenceError),
    /// Telemetry transport failed or the collector refused the report.
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::HardwareSetup(e) => write!(f, "hardware: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<HwSetupError> for Error {
    fn from(e: HwSetupError) -> Self {
        Self::HardwareSetup(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware setup errors
// ---------------------------------------------------------------------------

/// Failures while bringing up the pulse input and the tick timer.
/// The `i32` payload is the raw ESP-IDF return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwSetupError {
    /// `gpio_config` for the pulse input failed.
    GpioConfigFailed(i32),
    /// GPIO ISR service install or handler registration failed.
    IsrInstallFailed(i32),
    /// Tick timer could not be created or started.
    TimerSetupFailed(i32),
    /// Flash filesystem could not be mounted.
    FilesystemMountFailed(i32),
}

impl fmt::Display for HwSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR setup failed (rc={})", rc),
            Self::TimerSetupFailed(rc) => write!(f, "tick timer setup failed (rc={})", rc),
            Self::FilesystemMountFailed(rc) => write!(f, "flash mount failed (rc={})", rc),
        }
    }
}

// ---------------------------------------------------------------------------
// Startup failures and exit codes
// ---------------------------------------------------------------------------

/// Fatal conditions that abort startup.  Each one has its own exit code so
/// a supervisor (or a human reading the boot log) can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    ConfigLoad(ConfigError),
    GpioSetup(HwSetupError),
    InterruptSetup(HwSetupError),
    TimerSetup(HwSetupError),
}

impl StartupError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigLoad(_) => 1,
            Self::GpioSetup(_) => 2,
            Self::InterruptSetup(_) => 3,
            Self::TimerSetup(_) => 4,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigLoad(e) => write!(f, "can't load configuration: {e}"),
            Self::GpioSetup(e) => write!(f, "unable to setup GPIO: {e}"),
            Self::InterruptSetup(e) => write!(f, "unable to setup ISR for GPIO: {e}"),
            Self::TimerSetup(e) => write!(f, "unable to setup tick timer: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<StartupError> for Error {
    fn from(e: StartupError) -> Self {
        match e {
            StartupError::ConfigLoad(c) => Self::Config(c),
            StartupError::GpioSetup(h)
            | StartupError::InterruptSetup(h)
            | StartupError::TimerSetup(h) => Self::HardwareSetup(h),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
