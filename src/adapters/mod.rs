//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter            | Implements     | Connects to                  |
//! |--------------------|----------------|------------------------------|
//! | `background_store` | CounterStore   | store worker thread          |
//! | `flash_store`      | CounterStore   | SPIFFS counter file          |
//! | `http`             | TelemetryPort  | EmonCMS over HTTP            |
//! | `lcdproc`          | DisplayPort    | LCDd server over TCP         |
//! | `log_sink`         | EventSink      | Serial log output            |
//! | `time`             | ClockPort      | esp_timer + SNTP wall clock  |
//! | `wifi`             | (none)         | ESP-IDF WiFi STA + SNTP      |

pub mod background_store;
pub mod flash_store;
pub mod http;
pub mod lcdproc;
pub mod log_sink;
pub mod time;
pub mod wifi;
