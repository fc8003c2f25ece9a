//! `rpsu-runtime` – the polling engine.
//!
//! One independent worker per device, each owning its own console session,
//! sharing nothing mutable with its siblings except the process-wide
//! settings it reads.
//!
//! # Modules
//!
//! - [`poller`] – [`DevicePoller`][poller::DevicePoller]: the per-device
//!   connect / navigate / emit / sleep loop.
//! - [`supervisor`] – [`PollingSupervisor`][supervisor::PollingSupervisor]:
//!   starts, restarts and stops pollers as the device list changes, and owns
//!   the settings channel.
//! - [`settings`] – [`PollSettings`][settings::PollSettings]: polling interval
//!   and shifted-journal flag.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console logging
//!   plus optional OTLP span export.
//!
//! # Failure isolation
//!
//! Nothing a device does can stop another device's poller or the process. A
//! failed connect, a missing board or a broken session becomes a
//! [`PollOutcome`][rpsu_types::PollOutcome] indicator and a full-interval
//! wait; a failed journal write is logged and otherwise ignored.

pub mod poller;
pub mod settings;
pub mod supervisor;
pub mod telemetry;

pub use poller::{DEFAULT_CONNECT_TIMEOUT, DevicePoller, PollerContext};
pub use settings::{ALLOWED_INTERVAL_MINUTES, DEFAULT_INTERVAL_MINUTES, PollSettings};
pub use supervisor::{PollingSupervisor, ReconcileReport};
pub use telemetry::{TracerProviderGuard, init_tracing};
