use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Standard remote-terminal port used when a registry entry omits one.
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Temperature (°C) above which a reading raises the alert flag.
pub const TEMPERATURE_ALERT_THRESHOLD_C: f64 = 40.0;

/// Two-digit board code the RPSU occupies in the device's board listing.
pub const DEFAULT_BOARD_ADDRESS: &str = "04";

fn default_port() -> u16 {
    DEFAULT_TELNET_PORT
}

/// One monitored power-supply chassis.
///
/// Serialised with the historical registry key `ip` for the address so
/// existing `devices.json` files load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Unique, user-chosen display name. Also names the journal files.
    pub name: String,
    /// Host name or IP address of the console.
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Device {
    /// Create a device on the default remote-terminal port.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: DEFAULT_TELNET_PORT,
        }
    }

    /// Override the port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

/// Raw on/off state reported by the RPSU board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RpsuStatus {
    On,
    Off,
    /// Only produced when restoring a journal row with an unrecognised status.
    Unknown,
}

impl RpsuStatus {
    /// Console spelling: `ON`, `OFF` or `UNKNOWN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpsuStatus::On => "ON",
            RpsuStatus::Off => "OFF",
            RpsuStatus::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive parse of `ON` / `OFF`; anything else is `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "ON" => RpsuStatus::On,
            "OFF" => RpsuStatus::Off,
            _ => RpsuStatus::Unknown,
        }
    }

    /// Numeric form used by the shifted journal: `1` for `On`, `0` otherwise.
    pub fn as_flag(&self) -> u8 {
        match self {
            RpsuStatus::On => 1,
            RpsuStatus::Off | RpsuStatus::Unknown => 0,
        }
    }
}

impl fmt::Display for RpsuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a single device session currently is in the menu script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
    NavigatingMenu,
    AwaitingDump,
}

/// One telemetry snapshot taken from a device.
///
/// Fields are private: a reading is assembled once through
/// [`ReadingBuilder`] and then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    timestamp: DateTime<Local>,
    status: RpsuStatus,
    uptime_hours: u64,
    voltage: String,
    current_ma: String,
    leak_current_ma: String,
    /// `None` when the engine runs the reduced field set.
    temperature_c: Option<String>,
}

impl Reading {
    /// Start building a reading stamped with `timestamp`.
    pub fn builder(timestamp: DateTime<Local>) -> ReadingBuilder {
        ReadingBuilder::new(timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn status(&self) -> RpsuStatus {
        self.status
    }

    pub fn uptime_hours(&self) -> u64 {
        self.uptime_hours
    }

    pub fn voltage(&self) -> &str {
        &self.voltage
    }

    pub fn current_ma(&self) -> &str {
        &self.current_ma
    }

    pub fn leak_current_ma(&self) -> &str {
        &self.leak_current_ma
    }

    pub fn temperature_c(&self) -> Option<&str> {
        self.temperature_c.as_deref()
    }

    /// `true` when the temperature is known and exceeds
    /// [`TEMPERATURE_ALERT_THRESHOLD_C`].
    pub fn temperature_alert(&self) -> bool {
        self.temperature_c
            .as_deref()
            .and_then(|t| t.parse::<f64>().ok())
            .is_some_and(|t| t > TEMPERATURE_ALERT_THRESHOLD_C)
    }
}

/// Builder for [`Reading`]. Unset fields keep the documented defaults
/// (`OFF`, `0`, `"0"`, no temperature).
#[derive(Debug, Clone)]
pub struct ReadingBuilder {
    inner: Reading,
}

impl ReadingBuilder {
    fn new(timestamp: DateTime<Local>) -> Self {
        Self {
            inner: Reading {
                timestamp,
                status: RpsuStatus::Off,
                uptime_hours: 0,
                voltage: "0".to_string(),
                current_ma: "0".to_string(),
                leak_current_ma: "0".to_string(),
                temperature_c: None,
            },
        }
    }

    pub fn status(mut self, status: RpsuStatus) -> Self {
        self.inner.status = status;
        self
    }

    pub fn uptime_hours(mut self, hours: u64) -> Self {
        self.inner.uptime_hours = hours;
        self
    }

    pub fn voltage(mut self, voltage: impl Into<String>) -> Self {
        self.inner.voltage = voltage.into();
        self
    }

    pub fn current_ma(mut self, current: impl Into<String>) -> Self {
        self.inner.current_ma = current.into();
        self
    }

    pub fn leak_current_ma(mut self, leak: impl Into<String>) -> Self {
        self.inner.leak_current_ma = leak.into();
        self
    }

    pub fn temperature_c(mut self, temperature: Option<String>) -> Self {
        self.inner.temperature_c = temperature;
        self
    }

    pub fn build(self) -> Reading {
        self.inner
    }
}

/// Result of exactly one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(Reading),
    /// The transport could not connect.
    NoLink,
    /// The board listing did not contain the RPSU board address.
    NoSubmenu,
    /// A transport fault happened after the session was open.
    CycleError,
}

impl PollOutcome {
    /// Presentation indicator for this outcome.
    pub fn indicator(&self) -> DeviceIndicator {
        match self {
            PollOutcome::Success(reading) => DeviceIndicator::for_status(reading.status()),
            PollOutcome::NoLink => DeviceIndicator::NoLink,
            PollOutcome::NoSubmenu => DeviceIndicator::NoSubmenu,
            PollOutcome::CycleError => DeviceIndicator::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success(_))
    }
}

/// Status shown next to a device by whatever presents the telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceIndicator {
    /// Nothing polled or journaled yet.
    NoData,
    Online,
    /// The board answered but reported `OFF`.
    Fault,
    NoLink,
    NoSubmenu,
    Error,
}

impl DeviceIndicator {
    /// Map a raw board status to what an operator sees. `OFF` is a fault.
    pub fn for_status(status: RpsuStatus) -> Self {
        match status {
            RpsuStatus::On => DeviceIndicator::Online,
            RpsuStatus::Off => DeviceIndicator::Fault,
            RpsuStatus::Unknown => DeviceIndicator::NoData,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceIndicator::NoData => "no data",
            DeviceIndicator::Online => "ON",
            DeviceIndicator::Fault => "FAULT",
            DeviceIndicator::NoLink => "no link",
            DeviceIndicator::NoSubmenu => "no submenu",
            DeviceIndicator::Error => "error",
        }
    }
}

impl fmt::Display for DeviceIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Message handed from a poller to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Name of the device the event belongs to.
    pub device: String,
    pub payload: PollPayload,
}

impl PollEvent {
    /// Wrap `payload` for `device`, stamped now.
    pub fn new(device: impl Into<String>, payload: PollPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device: device.into(),
            payload,
        }
    }

    /// Build the event that reports `outcome`.
    pub fn from_outcome(device: impl Into<String>, outcome: &PollOutcome) -> Self {
        let payload = match outcome {
            PollOutcome::Success(reading) => PollPayload::Reading {
                alert: reading.temperature_alert(),
                reading: reading.clone(),
            },
            other => PollPayload::Indicator(other.indicator()),
        };
        Self::new(device, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PollPayload {
    /// A completed cycle plus the derived temperature alert.
    Reading { reading: Reading, alert: bool },
    /// A cycle that produced no reading.
    Indicator(DeviceIndicator),
}

/// Which historical engine variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Temperature included, up to five devices.
    #[default]
    Full,
    /// No temperature, up to three devices, slower menu delays.
    Reduced,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Full => write!(f, "full"),
            ProfileKind::Reduced => write!(f, "reduced"),
        }
    }
}

/// Parameters of the polling engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProfile {
    /// Board code expected in the `ECHO` listing and selected with `%1<code>`.
    pub board_address: String,
    /// Run the `STATUS` step and carry a temperature column.
    pub read_temperature: bool,
    /// Upper bound on concurrently polled devices.
    pub max_devices: usize,
    /// Fixed wait after every menu command.
    pub menu_delay: Duration,
    /// Fixed wait after `SHOW`; the dump is larger.
    pub dump_delay: Duration,
}

impl EngineProfile {
    pub fn full() -> Self {
        Self {
            board_address: DEFAULT_BOARD_ADDRESS.to_string(),
            read_temperature: true,
            max_devices: 5,
            menu_delay: Duration::from_secs(1),
            dump_delay: Duration::from_secs(2),
        }
    }

    pub fn reduced() -> Self {
        Self {
            board_address: DEFAULT_BOARD_ADDRESS.to_string(),
            read_temperature: false,
            max_devices: 3,
            menu_delay: Duration::from_secs(2),
            dump_delay: Duration::from_secs(3),
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Full => Self::full(),
            ProfileKind::Reduced => Self::reduced(),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::full()
    }
}

/// Error type shared by every crate in the workspace.
///
/// A missing telemetry field is deliberately not represented here: the
/// extractors substitute the documented default instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpsuError {
    #[error("cannot connect to {address}:{port}: {details}")]
    ConnectFailed {
        address: String,
        port: u16,
        details: String,
    },

    #[error("board {board} not present in the board listing")]
    SubmenuNotFound { board: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("device registry error: {0}")]
    Registry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("journal error: {0}")]
    Journal(String),
}
