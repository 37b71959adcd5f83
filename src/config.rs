//! Runtime configuration
//!
//! All tunable parameters of the energy monitor.  Values come from an
//! ini-style file on the flash filesystem (`/flash/emon.conf`):
//!
//! ```ini
//! [counter]
//! pulse_input_pin = 4
//! wh_per_pulse = 1
//! pulse_length = 0      ; 0 = learn from first pulse
//! max_power = 20000
//!
//! [webapi]
//! api_key = 0123456789abcdef
//! ```
//!
//! Unknown keys and unparsable values are logged and skipped; only an
//! unreadable file or a value set that fails [`MeterConfig::validate`] is
//! fatal.

use core::fmt;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Default location of the configuration file on the device.
pub const CONFIG_PATH: &str = "/flash/emon.conf";

/// Default EmonCMS endpoint.
pub const DEFAULT_API_BASE_URI: &str = "http://emoncms.org";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be opened or read.
    Unreadable,
    /// `wh_per_pulse` must be at least 1.
    ZeroWhPerPulse,
    /// `max_power` must be at least 1.
    ZeroMaxPower,
    /// `tick_period` must lie in 1..=60 s so no minute is skipped.
    TickPeriodOutOfRange(u32),
    /// `pulse_tolerance` must lie in 1..=50 %.
    ToleranceOutOfRange(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable => write!(f, "configuration file unreadable"),
            Self::ZeroWhPerPulse => write!(f, "wh_per_pulse must be > 0"),
            Self::ZeroMaxPower => write!(f, "max_power must be > 0"),
            Self::TickPeriodOutOfRange(s) => write!(f, "tick_period {}s outside 1..=60", s),
            Self::ToleranceOutOfRange(p) => write!(f, "pulse_tolerance {}% outside 1..=50", p),
        }
    }
}

/// A single rejected `section.key = value` entry.  Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryError {
    UnknownKey,
    BadValue,
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey => write!(f, "unknown config parameter"),
            Self::BadValue => write!(f, "unparsable value"),
        }
    }
}

// ---------------------------------------------------------------------------
// MeterConfig
// ---------------------------------------------------------------------------

/// Immutable runtime parameters, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    // --- [counter] ---
    /// GPIO number of the pulse input (active low, pulled up).
    pub pulse_input_pin: u8,
    /// Energy represented by one meter pulse.
    pub wh_per_pulse: u32,
    /// Reference pulse width; 0 = learn from the first pulse.
    pub pulse_length_ms: u32,
    /// Accepted deviation from the reference width (%).
    pub pulse_tolerance_pct: u8,
    /// Pulse spacing at or below this is a glitch.
    pub min_pulse_period_ms: u32,
    /// Readings at or above this are implausible.
    pub max_power_w: u32,
    /// GPIO of an active-low stop button; `None` runs until power-off.
    pub stop_input_pin: Option<u8>,

    // --- [storage] ---
    /// Directory holding the counter file; `None` disables persistence.
    pub flash_dir: Option<String>,

    // --- [lcd] ---
    pub lcdproc_host: String,
    pub lcdproc_port: u16,

    // --- [webapi] ---
    pub api_base_uri: String,
    pub api_key: String,
    /// Minimum seconds between two report transmissions.
    pub api_update_rate_s: u32,
    /// EmonCMS node; 0 is sent as 1.
    pub node_number: u32,

    // --- [wifi] ---
    pub wifi_ssid: String,
    pub wifi_password: String,

    // --- [clock] ---
    /// POSIX TZ string used for the local wall clock.
    pub timezone: String,
    /// Accounting tick period (s).
    pub tick_period_s: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            pulse_input_pin: 4,
            wh_per_pulse: 1,
            pulse_length_ms: 0,
            pulse_tolerance_pct: 5,
            min_pulse_period_ms: 200,
            max_power_w: 20_000,
            stop_input_pin: None,

            flash_dir: Some("/flash".into()),

            lcdproc_host: "localhost".into(),
            lcdproc_port: 13666,

            api_base_uri: DEFAULT_API_BASE_URI.into(),
            api_key: String::new(),
            api_update_rate_s: 30,
            node_number: 0,

            wifi_ssid: String::new(),
            wifi_password: String::new(),

            timezone: "UTC0".into(),
            tick_period_s: 30,
        }
    }
}

fn parse<T: core::str::FromStr>(value: &str) -> Result<T, EntryError> {
    value.parse().map_err(|_| EntryError::BadValue)
}

impl MeterConfig {
    /// Apply one `section.key = value` entry.
    pub fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), EntryError> {
        match (section, key) {
            ("counter", "pulse_input_pin") => self.pulse_input_pin = parse(value)?,
            ("counter", "wh_per_pulse") => self.wh_per_pulse = parse(value)?,
            ("counter", "pulse_length") => self.pulse_length_ms = parse(value)?,
            ("counter", "pulse_tolerance") => self.pulse_tolerance_pct = parse(value)?,
            ("counter", "min_pulse_period") => self.min_pulse_period_ms = parse(value)?,
            ("counter", "max_power") => self.max_power_w = parse(value)?,
            ("counter", "stop_input_pin") => {
                self.stop_input_pin = if value.is_empty() { None } else { Some(parse(value)?) };
            }
            ("storage", "flash_dir") => {
                self.flash_dir = (!value.is_empty()).then(|| value.to_owned());
            }
            ("lcd", "lcdproc_host") => self.lcdproc_host = value.to_owned(),
            ("lcd", "lcdproc_port") => self.lcdproc_port = parse(value)?,
            ("webapi", "api_base_uri") => self.api_base_uri = value.to_owned(),
            ("webapi", "api_key") => self.api_key = value.to_owned(),
            ("webapi", "api_update_rate") => self.api_update_rate_s = parse(value)?,
            ("webapi", "node_number") => self.node_number = parse(value)?,
            ("wifi", "ssid") => self.wifi_ssid = value.to_owned(),
            ("wifi", "password") => self.wifi_password = value.to_owned(),
            ("clock", "timezone") => self.timezone = value.to_owned(),
            ("clock", "tick_period") => self.tick_period_s = parse(value)?,
            _ => return Err(EntryError::UnknownKey),
        }
        Ok(())
    }

    /// Parse ini text on top of the defaults.  Bad entries are logged and
    /// skipped; the result is not validated.
    pub fn from_ini(text: &str) -> Self {
        let mut cfg = Self::default();
        let mut section = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                match name.strip_suffix(']') {
                    Some(name) => section = name.trim().to_owned(),
                    None => warn!("config line {}: unterminated section header", lineno),
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("config line {}: expected key = value", lineno);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if let Err(e) = cfg.apply(&section, key, value) {
                warn!("config line {}: {} {}/{}", lineno, e, section, key);
            }
        }

        cfg
    }

    /// Read, parse and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            warn!("can't read {}: {}", path.display(), e);
            ConfigError::Unreadable
        })?;
        let cfg = Self::from_ini(&text);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wh_per_pulse == 0 {
            return Err(ConfigError::ZeroWhPerPulse);
        }
        if self.max_power_w == 0 {
            return Err(ConfigError::ZeroMaxPower);
        }
        if !(1..=60).contains(&self.tick_period_s) {
            return Err(ConfigError::TickPeriodOutOfRange(self.tick_period_s));
        }
        if !(1..=50).contains(&self.pulse_tolerance_pct) {
            return Err(ConfigError::ToleranceOutOfRange(self.pulse_tolerance_pct));
        }
        Ok(())
    }

    /// Node number as sent on the wire.
    pub fn effective_node(&self) -> u32 {
        if self.node_number == 0 { 1 } else { self.node_number }
    }

    /// JSON view of the configuration with secrets masked.
    pub fn to_redacted_json(&self) -> String {
        let mut shown = self.clone();
        if !shown.api_key.is_empty() {
            shown.api_key = "***".into();
        }
        if !shown.wifi_password.is_empty() {
            shown.wifi_password = "***".into();
        }
        serde_json::to_string(&shown).unwrap_or_else(|_| String::from("{}"))
    }

    /// Log the effective configuration at startup.
    pub fn log_summary(&self) {
        info!("config: {}", self.to_redacted_json());
    }
}

/// Drop a `;`/`#` comment: whole-line, or inline when preceded by whitespace.
fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        if (b == b';' || b == b'#') && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}
