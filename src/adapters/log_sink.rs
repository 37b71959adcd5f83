//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, SubmitOutcome};

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(c) => {
                info!("START | day={} month={} pulses", c.pulses_today, c.pulses_month);
            }
            AppEvent::Measured {
                measurement: m,
                reported,
            } => {
                let report = match reported {
                    None => "local",
                    Some(SubmitOutcome::Accepted) => "sent",
                    Some(SubmitOutcome::Busy) => "busy",
                };
                debug!(
                    "PULSE | P={}W day={}Wh month={}Wh | report={}",
                    m.instant_power_w, m.energy_day_wh, m.energy_month_wh, report
                );
            }
            AppEvent::PulseRejected(reason) => {
                debug!("PULSE | rejected: {}", reason);
            }
            AppEvent::OutOfSequence(e) => {
                debug!("PULSE | {}", e);
            }
            AppEvent::DailyReset { previous_wh } => {
                info!("RESET | daily, was {}Wh", previous_wh);
            }
            AppEvent::MonthlyReset { previous_wh } => {
                info!("RESET | monthly, was {}Wh", previous_wh);
            }
            AppEvent::HourlyReport {
                measurement: m,
                outcome,
            } => {
                info!(
                    "HOUR  | P={}W day={}Wh month={}Wh | report={:?}",
                    m.instant_power_w, m.energy_day_wh, m.energy_month_wh, outcome
                );
            }
            AppEvent::CountersSaved(c) => {
                debug!("SAVE  | day={} month={} pulses", c.pulses_today, c.pulses_month);
            }
            AppEvent::SaveFailed(e) => {
                warn!("SAVE  | failed: {}", e);
            }
            AppEvent::EventsDropped(n) => {
                warn!("QUEUE | {} events dropped", n);
            }
            AppEvent::Stopped => {
                info!("STOP  | energy monitor exiting");
            }
        }
    }
}
