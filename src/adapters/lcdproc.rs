//! lcdproc display adapter.
//!
//! Implements [`DisplayPort`] as a client of an `LCDd` server over TCP
//! (lwIP sockets on the device, the host stack in simulation).
//!
//! ## Screen layout
//!
//! One screen `emon` with a title widget and three string widgets on rows
//! 2–4.  Each update is a `widget_set emon lineN 1 <row> {text}` command.
//!
//! ## Connection model
//!
//! 1. [`LcdprocDisplay::connect`] tries a few times at startup, then gives
//!    up without failing the firmware (display disabled).
//! 2. A write error drops the connection.  The next update after
//!    [`RECONNECT_INTERVAL`] reconnects and rebuilds the screen.  That
//!    attempt runs on the main loop, so it is bounded by
//!    [`CONNECT_TIMEOUT`] plus [`HELLO_WAIT`] per resolved address.
//! 3. Server responses (`success`, `listen`, ...) are drained without
//!    blocking after every command batch so the socket never backs up.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::DisplayPort;
use crate::display::DisplayLines;

pub const DEFAULT_PORT: u16 = 13666;

/// Minimum time between two reconnect attempts from `show()`.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on one TCP connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to wait for the server banner after `hello`.
pub const HELLO_WAIT: Duration = Duration::from_millis(500);

const SCREEN: &str = "emon";
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands that build the screen after `hello`.
pub const SCREEN_SETUP: [&str; 9] = [
    "screen_add emon\n",
    "screen_set emon -name emon\n",
    "screen_set emon -priority foreground\n",
    "screen_set emon -heartbeat off\n",
    "widget_add emon title title\n",
    "widget_set emon title {Energy Monitor}\n",
    "widget_add emon line1 string\n",
    "widget_add emon line2 string\n",
    "widget_add emon line3 string\n",
];

/// `widget_set` command for display line `idx` (0-based, rows 2..=4).
pub fn widget_command(idx: usize, text: &str) -> String {
    format!("widget_set {} line{} 1 {} {{{}}}\n", SCREEN, idx + 1, idx + 2, text)
}

pub struct LcdprocDisplay {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    last_attempt: Option<Instant>,
}

impl LcdprocDisplay {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            stream: None,
            last_attempt: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect with `attempts` tries, `delay` apart.  Returns whether the
    /// display is available; failure is not fatal.
    pub fn connect(&mut self, attempts: u32, delay: Duration) -> bool {
        for remaining in (0..attempts.max(1)).rev() {
            if self.try_connect() {
                return true;
            }
            if remaining > 0 {
                warn!(
                    "LCD: server {}:{} not available, retrying ({} more)",
                    self.host, self.port, remaining
                );
                std::thread::sleep(delay);
            }
        }
        warn!("LCD: unable to reach {}:{}, display is disabled", self.host, self.port);
        false
    }

    fn try_connect(&mut self) -> bool {
        self.last_attempt = Some(Instant::now());
        match self.open() {
            Ok(stream) => {
                info!("LCD: connected to {}:{}", self.host, self.port);
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                debug!("LCD: connect failed: {}", e);
                false
            }
        }
    }

    fn open(&self) -> std::io::Result<TcpStream> {
        let mut last = std::io::Error::new(ErrorKind::NotFound, "host did not resolve");
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::handshake(stream),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    fn handshake(mut stream: TcpStream) -> std::io::Result<TcpStream> {
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true)?;

        stream.write_all(b"hello\n")?;
        // Wait for the server's "connect ..." banner before building the screen.
        stream.set_read_timeout(Some(HELLO_WAIT))?;
        let mut banner = [0u8; 128];
        match stream.read(&mut banner) {
            Ok(n) => debug!("LCD: {}", String::from_utf8_lossy(&banner[..n]).trim_end()),
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(e),
        }

        for cmd in SCREEN_SETUP {
            stream.write_all(cmd.as_bytes())?;
        }
        stream.set_nonblocking(true)?;
        drain(&mut stream);
        Ok(stream)
    }

    fn send(&mut self, lines: &DisplayLines) -> std::io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut batch = String::new();
        for (idx, text) in lines.iter().enumerate() {
            batch.push_str(&widget_command(idx, text));
        }
        stream.set_nonblocking(false)?;
        stream.write_all(batch.as_bytes())?;
        stream.set_nonblocking(true)?;
        drain(stream);
        Ok(())
    }

    fn reconnect_due(&self) -> bool {
        self.last_attempt
            .is_none_or(|t| t.elapsed() >= RECONNECT_INTERVAL)
    }
}

impl DisplayPort for LcdprocDisplay {
    fn show(&mut self, lines: &DisplayLines) {
        if self.stream.is_none() {
            if !self.reconnect_due() {
                return;
            }
            info!("LCD: reconnecting to {}:{}", self.host, self.port);
            if !self.try_connect() {
                return;
            }
        }
        if let Err(e) = self.send(lines) {
            warn!("LCD: broken connection to LCDd ({}), will reconnect", e);
            self.stream = None;
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            info!("LCD: connection closed");
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Discard whatever the server has sent so far.  Non-blocking stream only.
fn drain(stream: &mut TcpStream) {
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::Measurement;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn widget_commands_address_rows() {
        assert_eq!(
            widget_command(0, "Power now: 5W"),
            "widget_set emon line1 1 2 {Power now: 5W}\n"
        );
        assert_eq!(
            widget_command(2, "Energy mon: 1.0kWh"),
            "widget_set emon line3 1 4 {Energy mon: 1.0kWh}\n"
        );
    }

    #[test]
    fn handshake_and_update_reach_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut received = Vec::new();
            // hello + setup + three widget updates
            for i in 0..(1 + SCREEN_SETUP.len() + 3) {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if i == 0 {
                    writer.write_all(b"connect LCDproc 0.5.9 protocol 0.3 lcd wid 20 hgt 4\n").unwrap();
                } else {
                    writer.write_all(b"success\n").unwrap();
                }
                received.push(line);
            }
            received
        });

        let mut lcd = LcdprocDisplay::new("127.0.0.1", port);
        assert!(lcd.connect(1, Duration::ZERO));
        lcd.show(&DisplayLines::from_measurement(&Measurement {
            instant_power_w: 420,
            energy_day_wh: 1_500,
            energy_month_wh: 30_000,
        }));

        let received = server.join().unwrap();
        assert_eq!(received[0], "hello\n");
        assert_eq!(received[1], "screen_add emon\n");
        assert_eq!(received[SCREEN_SETUP.len() + 1], "widget_set emon line1 1 2 {Power now: 420W}\n");
        assert_eq!(received[SCREEN_SETUP.len() + 2], "widget_set emon line2 1 3 {Energy day: 1.5kWh}\n");
        assert_eq!(received[SCREEN_SETUP.len() + 3], "widget_set emon line3 1 4 {Energy mon: 30.0kWh}\n");

        lcd.close();
        assert!(!lcd.is_connected());
    }

    #[test]
    fn unreachable_server_disables_display() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let mut lcd = LcdprocDisplay::new("127.0.0.1", port);
        assert!(!lcd.connect(2, Duration::from_millis(1)));
        // Within the reconnect interval show() is a no-op.
        lcd.show(&DisplayLines::default());
        assert!(!lcd.is_connected());
    }

    #[test]
    fn reconnect_from_show_is_bounded() {
        // Non-routable address: the connect either times out or fails fast.
        let mut lcd = LcdprocDisplay::new("10.255.255.1", DEFAULT_PORT);
        let started = Instant::now();
        lcd.show(&DisplayLines::default());
        assert!(!lcd.is_connected());
        assert!(started.elapsed() < CONNECT_TIMEOUT + HELLO_WAIT + Duration::from_millis(500));
    }
}
