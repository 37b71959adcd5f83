//! Energy monitor firmware: main entry point.
//!
//! Hexagonal architecture with interrupt-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  LcdprocDisplay   LogEventSink   BackgroundStore   Esp32Time   │
//! │  (DisplayPort)    (EventSink)    (CounterStore)    (ClockPort) │
//! │  ReportDispatcher ─▶ report worker (Core 0) ─▶ HttpTransport   │
//! │  BackgroundStore  ─▶ store worker  (Core 0) ─▶ FileCounterStore│
//! │  WifiSupervisor   ─▶ wifi thread   (Core 0) ─▶ EspWifi + SNTP  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            MeterService (pure logic)                   │    │
//! │  │  PulseValidator · PowerMeter · AccountingClock         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  GPIO ISR (edges, stop) · esp_timer (ticks) ─▶ EventQueue      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The event loop only ever touches memory and the LCD socket; flash
//! writes, WiFi and reports run on their own threads.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use emon::adapters::background_store::BackgroundStore;
use emon::adapters::flash_store::FileCounterStore;
use emon::adapters::http::HttpTransport;
use emon::adapters::lcdproc::LcdprocDisplay;
use emon::adapters::log_sink::LogEventSink;
use emon::adapters::time::Esp32TimeAdapter;
use emon::adapters::wifi::{SupervisorPlan, WifiAdapter, WifiSupervisor};
use emon::app::ports::CounterStore;
use emon::app::service::{LoopControl, MeterService};
use emon::config::{MeterConfig, CONFIG_PATH};
use emon::dispatch::ReportDispatcher;
use emon::drivers::pulse_input::{self, RawGpioInput};
use emon::drivers::stop_input;
use emon::drivers::{hw_init, hw_timer};
use emon::error::{HwSetupError, StartupError};
use emon::events;
use emon::telemetry::ReportTarget;

const LCD_CONNECT_ATTEMPTS: u32 = 5;
const LCD_CONNECT_DELAY: Duration = Duration::from_secs(5);
const WIFI_PLAN: SupervisorPlan = SupervisorPlan {
    connect_attempts: 5,
    sntp_wait: Duration::from_secs(15),
    poll_interval: Duration::from_secs(5),
};

fn abort_startup(e: StartupError) -> ! {
    error!("{}", e);
    std::process::exit(e.exit_code())
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Energy monitor v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Flash filesystem + configuration ───────────────────
    if let Err(e) = hw_init::mount_flash() {
        // Config load below fails with its own exit code.
        error!("{}", e);
    }
    let config = match MeterConfig::load(Path::new(CONFIG_PATH)) {
        Ok(c) => c,
        Err(e) => abort_startup(StartupError::ConfigLoad(e)),
    };
    config.log_summary();
    hw_init::set_timezone(&config.timezone);

    // ── 3. Network + wall clock ───────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let modem = peripherals.modem;
    let wifi = WifiSupervisor::spawn(
        move || {
            let driver = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
            BlockingWifi::wrap(driver, sysloop).map(WifiAdapter::new)
        },
        config.wifi_ssid.clone(),
        config.wifi_password.clone(),
        WIFI_PLAN,
    )?;
    wifi.wait_ready();

    // ── 4. Persistence ────────────────────────────────────────
    let mut store = None;
    let mut restored = None;
    match config.flash_dir.as_deref().map(FileCounterStore::new) {
        Some(file) => {
            restored = file.load().unwrap_or_else(|e| {
                warn!("Counter restore failed ({}), starting from zero", e);
                None
            });
            match BackgroundStore::spawn(file, restored) {
                Ok(s) => store = Some(s),
                Err(e) => error!("Store worker failed to start ({}), counters not saved", e),
            }
        }
        None => info!("Persistence disabled (no flash directory)"),
    }

    // ── 5. Display ────────────────────────────────────────────
    let mut lcd = LcdprocDisplay::new(&config.lcdproc_host, config.lcdproc_port);
    lcd.connect(LCD_CONNECT_ATTEMPTS, LCD_CONNECT_DELAY);

    // ── 6. Report worker ──────────────────────────────────────
    let mut reports = ReportDispatcher::new();
    if let Err(e) = reports.spawn_worker(
        HttpTransport::new,
        ReportTarget::from_config(&config),
        Duration::from_secs(u64::from(config.api_update_rate_s)),
    ) {
        error!("Report worker failed to start ({}), reports disabled", e);
    }

    // ── 7. Service ────────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut service = MeterService::new(&config);
    service.start(restored, &mut lcd, &mut sink);

    // ── 8. Pulse input + tick timer ───────────────────────────
    let pin = config.pulse_input_pin;
    if let Err(e) = pulse_input::configure(pin) {
        abort_startup(StartupError::GpioSetup(e));
    }
    pulse_input::check_idle_level(&mut RawGpioInput(i32::from(pin)));
    if let Err(e) = pulse_input::install_isr(pin) {
        abort_startup(StartupError::InterruptSetup(e));
    }
    if let Some(stop_pin) = config.stop_input_pin {
        match stop_input::install(stop_pin) {
            Ok(()) => {}
            Err(e @ HwSetupError::GpioConfigFailed(_)) => abort_startup(StartupError::GpioSetup(e)),
            Err(e) => abort_startup(StartupError::InterruptSetup(e)),
        }
    }
    if let Err(e) = hw_timer::start_tick_timer(Duration::from_secs(u64::from(config.tick_period_s))) {
        abort_startup(StartupError::TimerSetup(e));
    }

    // ── 9. Event loop ─────────────────────────────────────────
    info!("Entering event loop");
    let clock = Esp32TimeAdapter::new();
    let queue = events::queue();
    loop {
        let event = queue.wait();
        service.report_dropped(queue.take_dropped(), &mut sink);

        let store_ref = store.as_mut().map(|s| s as &mut dyn CounterStore);
        if service.handle_event(event, &clock, &mut lcd, &mut reports, store_ref, &mut sink)
            == LoopControl::Stop
        {
            break;
        }
    }

    hw_timer::stop_tick_timer();
    wifi.stop();
    info!("Event loop exited, stopped by button");
    Ok(())
}
