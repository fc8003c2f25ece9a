//! Console presentation of poll results.
//!
//! [`run`] consumes the device-status topic and prints one line per cycle.
//! [`StatusBoard`] remembers the latest state per device for `/devices`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use colored::{ColoredString, Colorize};
use rpsu_middleware::TopicReceiver;
use rpsu_types::{DeviceIndicator, PollEvent, PollPayload, Reading};

/// What is currently known about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceView {
    pub indicator: DeviceIndicator,
    /// Last reading, kept when later cycles fail.
    pub reading: Option<Reading>,
    pub alert: bool,
}

impl DeviceView {
    fn from_reading(reading: Option<Reading>) -> Self {
        match reading {
            Some(reading) => Self {
                indicator: DeviceIndicator::for_status(reading.status()),
                alert: reading.temperature_alert(),
                reading: Some(reading),
            },
            None => Self {
                indicator: DeviceIndicator::NoData,
                reading: None,
                alert: false,
            },
        }
    }
}

/// Latest state per device, shared between the presenter task and the shell.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<HashMap<String, DeviceView>>>,
}

impl StatusBoard {
    /// Start `device` from a journaled reading, or from nothing.
    pub fn seed(&self, device: &str, last: Option<Reading>) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(device.to_string(), DeviceView::from_reading(last));
        }
    }

    pub fn forget(&self, device: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(device);
        }
    }

    pub fn apply(&self, event: &PollEvent) {
        let Ok(mut map) = self.inner.lock() else {
            return;
        };
        let view = map
            .entry(event.device.clone())
            .or_insert_with(|| DeviceView::from_reading(None));
        match &event.payload {
            PollPayload::Reading { reading, alert } => {
                view.indicator = DeviceIndicator::for_status(reading.status());
                view.reading = Some(reading.clone());
                view.alert = *alert;
            }
            PollPayload::Indicator(indicator) => {
                view.indicator = *indicator;
                view.alert = false;
            }
        }
    }

    pub fn view(&self, device: &str) -> Option<DeviceView> {
        self.inner.lock().ok().and_then(|map| map.get(device).cloned())
    }
}

/// Print every status event until the bus goes away.
pub async fn run(mut rx: TopicReceiver, board: StatusBoard) {
    while let Some(event) = rx.next_event().await {
        board.apply(&event);
        println!("{}", render_event(&event));
    }
}

/// One line for a poll event.
pub fn render_event(event: &PollEvent) -> String {
    let stamp = event
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string();
    let body = match &event.payload {
        PollPayload::Reading { reading, alert } => render_values(reading, *alert),
        PollPayload::Indicator(indicator) => indicator_label(*indicator).to_string(),
    };
    format!("[{}] {} {}", stamp.dimmed(), event.device.bold(), body)
}

/// Status plus measured values of a reading.
pub fn render_values(reading: &Reading, alert: bool) -> String {
    let mut line = format!(
        "{}  uptime {} h  {} V  {} mA  leak {} mA",
        indicator_label(DeviceIndicator::for_status(reading.status())),
        reading.uptime_hours(),
        reading.voltage(),
        reading.current_ma(),
        reading.leak_current_ma(),
    );
    if let Some(temperature) = reading.temperature_c() {
        let text = format!("{temperature} °C");
        let text = if alert {
            text.truecolor(255, 165, 0).bold()
        } else {
            text.normal()
        };
        line.push_str(&format!("  {text}"));
    }
    line
}

pub fn indicator_label(indicator: DeviceIndicator) -> ColoredString {
    let label = indicator.label();
    match indicator {
        DeviceIndicator::Online => label.green().bold(),
        DeviceIndicator::Fault => label.red().bold(),
        DeviceIndicator::NoLink | DeviceIndicator::NoSubmenu => label.yellow(),
        DeviceIndicator::Error => label.red(),
        DeviceIndicator::NoData => label.dimmed(),
    }
}
