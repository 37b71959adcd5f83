//! WiFi station-mode adapter with SNTP time sync.
//!
//! The meter needs the network for two things only: reports and the wall
//! clock that drives midnight resets and hourly saves.  Neither is fatal
//! when missing: reports fail and are retried with fresh totals, and the
//! accounting clock skips ticks until SNTP has set the time.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` and `EspSntp`
//!   from esp-idf-svc.
//! - **all other targets**: simulation that always connects.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) between attempts, checked from [`WifiAdapter::poll`].
//!
//! ## Supervisor thread
//!
//! Connecting blocks for seconds, so the adapter never runs on the metering
//! loop.  [`WifiSupervisor::spawn`] builds it on its own Core 0 thread,
//! makes the startup attempt plus SNTP wait, signals the result, then polls
//! the link until stopped.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{error, info, warn};

use crate::drivers::task_pin::{self, Core};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

pub fn next_backoff(secs: u32) -> u32 {
    secs.saturating_mul(2).min(MAX_BACKOFF_SECS)
}

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    last_attempt: Option<Instant>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(target_os = "espidf")]
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            last_attempt: None,
            wifi,
            sntp: None,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            last_attempt: None,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.platform_is_connected()
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(u64::from(self.backoff_secs))
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    /// One connection attempt.
    pub fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        info!("WiFi: connecting to '{}'", self.ssid);
        self.last_attempt = Some(Instant::now());
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                let attempt = match self.state {
                    WifiState::Reconnecting { attempt } => attempt + 1,
                    _ => 0,
                };
                self.state = WifiState::Reconnecting { attempt };
                Err(e)
            }
        }
    }

    /// Up to `attempts` tries with backoff in between.  Startup only.
    pub fn connect_with_retry(&mut self, attempts: u32) -> Result<(), ConnectivityError> {
        let mut last = Err(ConnectivityError::ConnectionFailed);
        for n in 0..attempts.max(1) {
            last = self.connect();
            if last.is_ok() || last == Err(ConnectivityError::NoCredentials) {
                break;
            }
            if n + 1 < attempts {
                std::thread::sleep(self.backoff());
                self.backoff_secs = next_backoff(self.backoff_secs);
            }
        }
        last
    }

    /// Detect a lost link and reconnect once the backoff has elapsed.
    pub fn poll(&mut self) {
        match self.state {
            WifiState::Connected if !self.platform_is_connected() => {
                warn!("WiFi: connection lost, entering reconnect");
                self.state = WifiState::Reconnecting { attempt: 0 };
            }
            WifiState::Reconnecting { attempt } => {
                let due = self
                    .last_attempt
                    .is_none_or(|t| t.elapsed() >= self.backoff());
                if !due {
                    return;
                }
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt, self.backoff_secs);
                if self.connect().is_err() {
                    self.backoff_secs = next_backoff(self.backoff_secs);
                }
            }
            _ => {}
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let cfg = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        let fail = |e: esp_idf_svc::sys::EspError| {
            warn!("WiFi: {}", e);
            ConnectivityError::ConnectionFailed
        };
        self.wifi.set_configuration(&cfg).map_err(fail)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(fail)?;
        }
        self.wifi.connect().map_err(fail)?;
        self.wifi.wait_netif_up().map_err(fail)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        info!("WiFi(sim): connected to '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    // ── SNTP ──────────────────────────────────────────────────

    /// Start SNTP and wait up to `timeout` for the first sync.  Returns
    /// whether the clock is set; the accounting clock copes with either.
    #[cfg(target_os = "espidf")]
    pub fn sync_time(&mut self, timeout: Duration) -> bool {
        use esp_idf_svc::sntp::{EspSntp, SyncStatus};

        if self.sntp.is_none() {
            match EspSntp::new_default() {
                Ok(s) => self.sntp = Some(s),
                Err(e) => {
                    warn!("SNTP: start failed: {}", e);
                    return false;
                }
            }
        }
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self
                .sntp
                .as_ref()
                .is_some_and(|s| s.get_sync_status() == SyncStatus::Completed)
            {
                info!("SNTP: time synchronised");
                return true;
            }
            std::thread::sleep(Duration::from_millis(500));
        }
        warn!("SNTP: no sync after {}s, continuing in background", timeout.as_secs());
        false
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sync_time(&mut self, _timeout: Duration) -> bool {
        info!("SNTP(sim): host clock in use");
        true
    }
}

// ── Supervisor ────────────────────────────────────────────────

/// Startup attempts and link-check cadence for [`WifiSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPlan {
    pub connect_attempts: u32,
    pub sntp_wait: Duration,
    pub poll_interval: Duration,
}

/// Handle to the WiFi supervisor thread.
pub struct WifiSupervisor {
    ready: Arc<Signal<CriticalSectionRawMutex, bool>>,
    stop: Arc<AtomicBool>,
}

impl WifiSupervisor {
    /// Build the adapter on a new thread with `make_adapter`, connect it
    /// and keep it connected.  The driver is created on the supervisor
    /// thread, so it need not be `Send`.
    pub fn spawn<F, E>(
        make_adapter: F,
        ssid: String,
        password: String,
        plan: SupervisorPlan,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<WifiAdapter, E> + Send + 'static,
        E: fmt::Display,
    {
        let ready = Arc::new(Signal::new());
        let stop = Arc::new(AtomicBool::new(false));
        let (thread_ready, thread_stop) = (Arc::clone(&ready), Arc::clone(&stop));

        task_pin::spawn_on_core(Core::Pro, 3, 8, "wifi\0", move || {
            let mut wifi = match make_adapter() {
                Ok(w) => w,
                Err(e) => {
                    error!("WiFi: driver init failed: {}", e);
                    thread_ready.signal(false);
                    return;
                }
            };
            if let Err(e) = wifi.set_credentials(&ssid, &password) {
                warn!("WiFi disabled: {}", e);
                thread_ready.signal(false);
                return;
            }
            let up = wifi.connect_with_retry(plan.connect_attempts).is_ok();
            if up {
                wifi.sync_time(plan.sntp_wait);
            } else {
                warn!("WiFi unavailable, reports and wall-clock accounting wait for reconnect");
            }
            thread_ready.signal(up);

            while !thread_stop.load(Ordering::Acquire) {
                std::thread::sleep(plan.poll_interval);
                wifi.poll();
            }
            info!("WiFi: supervisor stopped");
        })?;

        Ok(Self { ready, stop })
    }

    /// Block until the startup attempt has finished; `true` if connected.
    /// Call once.
    pub fn wait_ready(&self) -> bool {
        futures_lite::future::block_on(self.ready.wait())
    }

    /// Ask the thread to exit after its current poll.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}
