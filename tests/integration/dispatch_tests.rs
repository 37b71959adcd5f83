//! Integration tests for the report path: dispatcher → worker thread →
//! transport, including the host HTTP transport against a local listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use emon::adapters::http::HttpTransport;
use emon::app::ports::{ReportPort, SubmitOutcome, TelemetryPort, TransportError};
use emon::dispatch::ReportDispatcher;
use emon::meter::Measurement;
use emon::telemetry::ReportTarget;

/// Records request URLs and answers with a fixed body.
struct SharedRecorder {
    urls: Arc<Mutex<Vec<String>>>,
    body: &'static str,
}

impl TelemetryPort for SharedRecorder {
    fn get(&mut self, url: &str) -> Result<String, TransportError> {
        self.urls.lock().unwrap().push(url.to_owned());
        Ok(self.body.to_owned())
    }
}

fn target(base: &str) -> ReportTarget {
    ReportTarget {
        base_uri: base.to_owned(),
        api_key: "KEY".to_owned(),
        node: 3,
    }
}

fn wait_idle(d: &ReportDispatcher, limit: Duration) -> bool {
    let started = Instant::now();
    while d.is_in_flight() {
        if started.elapsed() > limit {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

fn reading(power: u32) -> Measurement {
    Measurement {
        instant_power_w: power,
        energy_day_wh: 12,
        energy_month_wh: 340,
    }
}

#[test]
fn worker_sends_and_holds_slot_for_update_rate() {
    let urls = Arc::new(Mutex::new(Vec::new()));
    let worker_urls = Arc::clone(&urls);

    let mut d = ReportDispatcher::new();
    d.spawn_worker(
        move || SharedRecorder {
            urls: worker_urls,
            body: "ok",
        },
        target("http://collector"),
        Duration::from_millis(150),
    )
    .unwrap();

    let sent_at = Instant::now();
    assert_eq!(d.submit(reading(1_800)), SubmitOutcome::Accepted);
    assert_eq!(d.submit(reading(1_900)), SubmitOutcome::Busy);

    assert!(wait_idle(&d, Duration::from_secs(5)));
    assert!(sent_at.elapsed() >= Duration::from_millis(150));
    assert_eq!(
        urls.lock().unwrap().as_slice(),
        ["http://collector/input/post.json?apikey=KEY&node=3&json={power:1800,energy_day:12,energy_month:340}"]
    );

    assert_eq!(d.submit(reading(2_000)), SubmitOutcome::Accepted);
    assert!(wait_idle(&d, Duration::from_secs(5)));
    assert_eq!(urls.lock().unwrap().len(), 2);
}

#[test]
fn rejected_report_still_frees_slot() {
    let urls = Arc::new(Mutex::new(Vec::new()));
    let worker_urls = Arc::clone(&urls);

    let mut d = ReportDispatcher::new();
    d.spawn_worker(
        move || SharedRecorder {
            urls: worker_urls,
            body: "Invalid API key",
        },
        target("http://collector"),
        Duration::ZERO,
    )
    .unwrap();

    assert_eq!(d.submit(reading(5)), SubmitOutcome::Accepted);
    assert!(wait_idle(&d, Duration::from_secs(5)));
    assert_eq!(d.submit(reading(6)), SubmitOutcome::Accepted);
    assert!(wait_idle(&d, Duration::from_secs(5)));
    assert_eq!(urls.lock().unwrap().len(), 2);
}

#[test]
fn report_reaches_http_collector() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut stream = stream;
        stream
            .write_all(b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
        request_line
    });

    let mut d = ReportDispatcher::new();
    d.spawn_worker(
        HttpTransport::new,
        target(&format!("http://127.0.0.1:{}", port)),
        Duration::ZERO,
    )
    .unwrap();

    assert_eq!(
        d.submit(Measurement {
            instant_power_w: 0,
            energy_day_wh: 0,
            energy_month_wh: 7,
        }),
        SubmitOutcome::Accepted
    );
    let request_line = server.join().unwrap();
    assert_eq!(
        request_line,
        "GET /input/post.json?apikey=KEY&node=3&json={energy_month:7} HTTP/1.0\r\n"
    );
    assert!(wait_idle(&d, Duration::from_secs(5)));
}
