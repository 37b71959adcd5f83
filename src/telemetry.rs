//! EmonCMS report encoding.
//!
//! A report is a single HTTP GET:
//!
//! ```text
//! {base}/input/post.json?apikey={key}&node={node}&json={power:N,energy_day:N,energy_month:N}
//! ```
//!
//! Zero-valued fields are left out of the JSON-ish object (EmonCMS keeps
//! the previous input value).  The collector answers with the literal body
//! `ok` on success; anything else is a rejection.

use core::fmt::Write;
use core::time::Duration;

use heapless::String;
use log::debug;

use crate::app::ports::{TelemetryPort, TransportError};
use crate::config::MeterConfig;
use crate::meter::Measurement;

/// Request URL buffer capacity.
pub const URL_CAP: usize = 256;

/// Per-request timeout for the HTTP transport.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const INPUT_PATH: &str = "/input/post.json";
const RESPONSE_OK: &str = "ok";

pub type RequestUrl = String<URL_CAP>;

/// Collector endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub base_uri: std::string::String,
    pub api_key: std::string::String,
    pub node: u32,
}

impl ReportTarget {
    pub fn from_config(cfg: &MeterConfig) -> Self {
        Self {
            base_uri: cfg.api_base_uri.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            node: cfg.effective_node(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Build the request URL for one measurement.
pub fn build_url(target: &ReportTarget, m: &Measurement) -> Result<RequestUrl, TransportError> {
    let mut url = RequestUrl::new();
    write!(
        url,
        "{}{}?apikey={}&node={}&json={{",
        target.base_uri, INPUT_PATH, target.api_key, target.node
    )
    .map_err(|_| TransportError::UrlTooLong)?;

    let fields = [
        ("power", u64::from(m.instant_power_w)),
        ("energy_day", m.energy_day_wh),
        ("energy_month", m.energy_month_wh),
    ];
    let mut sep = "";
    for (name, value) in fields {
        if value == 0 {
            continue;
        }
        write!(url, "{}{}:{}", sep, name, value).map_err(|_| TransportError::UrlTooLong)?;
        sep = ",";
    }
    url.push('}').map_err(|_| TransportError::UrlTooLong)?;
    Ok(url)
}

/// `Ok` iff the collector answered exactly `ok`.
pub fn check_response(body: &str) -> Result<(), TransportError> {
    if body == RESPONSE_OK {
        Ok(())
    } else {
        Err(TransportError::Rejected)
    }
}

/// Encode, send and check one report.
pub fn send_report(
    transport: &mut impl TelemetryPort,
    target: &ReportTarget,
    m: &Measurement,
) -> Result<(), TransportError> {
    if !target.has_api_key() {
        return Err(TransportError::MissingApiKey);
    }
    let url = build_url(target, m)?;
    debug!("Telemetry: sending request: {}", url);
    let body = transport.get(&url)?;
    debug!("Telemetry: received response ({} chars): {}", body.len(), body);
    check_response(&body)
}
