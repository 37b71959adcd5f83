//! HTTP telemetry transport adapter.
//!
//! Implements [`TelemetryPort`]: one blocking GET per report, body
//! returned to the caller for classification.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` from esp-idf-svc
//!   with a 20 s timeout.
//! - **all other targets**: plain HTTP/1.0 over `std::net::TcpStream` for
//!   host-side testing against a local listener.

use log::warn;

use crate::app::ports::{TelemetryPort, TransportError};
use crate::telemetry::REQUEST_TIMEOUT;

/// Response bodies longer than this are truncated; `ok` is all we expect.
const MAX_BODY: usize = 1024;

pub struct HttpTransport {
    #[cfg(target_os = "espidf")]
    conn: Option<esp_idf_svc::http::client::EspHttpConnection>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            conn: None,
        }
    }

    #[cfg(target_os = "espidf")]
    fn connection(
        &mut self,
    ) -> Result<&mut esp_idf_svc::http::client::EspHttpConnection, TransportError> {
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        if self.conn.is_none() {
            let conn = EspHttpConnection::new(&Configuration {
                timeout: Some(REQUEST_TIMEOUT),
                ..Default::default()
            })
            .map_err(|e| {
                warn!("HTTP: client init failed: {}", e);
                TransportError::Connection
            })?;
            self.conn = Some(conn);
        }
        self.conn.as_mut().ok_or(TransportError::Connection)
    }

    #[cfg(target_os = "espidf")]
    fn platform_get(&mut self, url: &str) -> Result<String, TransportError> {
        use esp_idf_svc::http::Method;

        let result = (|| {
            let conn = self.connection()?;
            conn.initiate_request(Method::Get, url, &[]).map_err(|e| {
                warn!("HTTP: request failed: {}", e);
                TransportError::Connection
            })?;
            conn.initiate_response().map_err(|e| {
                warn!("HTTP: no response: {}", e);
                TransportError::Connection
            })?;

            let status = conn.status();
            if !(200..300).contains(&status) {
                return Err(TransportError::HttpStatus(status));
            }

            let mut body = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = conn.read(&mut buf).map_err(|_| TransportError::Connection)?;
                if n == 0 || body.len() >= MAX_BODY {
                    break;
                }
                body.extend_from_slice(&buf[..n]);
            }
            Ok(String::from_utf8_lossy(&body).into_owned())
        })();

        if result.is_err() {
            // Start the next report from a fresh connection.
            self.conn = None;
        }
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_get(&mut self, url: &str) -> Result<String, TransportError> {
        use std::io::{Read, Write};
        use std::net::TcpStream;

        let (authority, path) = split_http_url(url).ok_or(TransportError::Connection)?;
        let addr = if authority.contains(':') {
            authority.to_owned()
        } else {
            format!("{}:80", authority)
        };

        let io_err = |e: std::io::Error| {
            warn!("HTTP(sim): {}", e);
            TransportError::Connection
        };
        let mut stream = TcpStream::connect(&addr).map_err(io_err)?;
        stream.set_read_timeout(Some(REQUEST_TIMEOUT)).map_err(io_err)?;
        stream.set_write_timeout(Some(REQUEST_TIMEOUT)).map_err(io_err)?;
        write!(
            stream,
            "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, authority
        )
        .map_err(io_err)?;

        let mut raw = Vec::new();
        stream
            .take((MAX_BODY + 1024) as u64)
            .read_to_end(&mut raw)
            .map_err(io_err)?;
        let text = String::from_utf8_lossy(&raw);
        let (head, body) = text.split_once("\r\n\r\n").ok_or(TransportError::Connection)?;

        let status: u16 = head
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .ok_or(TransportError::Connection)?;
        if !(200..300).contains(&status) {
            return Err(TransportError::HttpStatus(status));
        }
        Ok(body.chars().take(MAX_BODY).collect())
    }
}

impl TelemetryPort for HttpTransport {
    fn get(&mut self, url: &str) -> Result<String, TransportError> {
        self.platform_get(url)
    }
}

/// Split `http://host[:port]/path?query` into authority and path+query.
#[cfg(not(target_os = "espidf"))]
fn split_http_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("http://")?;
    match rest.find('/') {
        Some(i) => Some((&rest[..i], &rest[i..])),
        None => Some((rest, "/")),
    }
}
