//! `rpsu-console` – talking to the vendor console.
//!
//! The power-supply chassis exposes nothing but a numbered-menu text console
//! over a raw remote-terminal connection. This crate turns that console into
//! a [`Reading`][rpsu_types::Reading].
//!
//! # Modules
//!
//! - [`transport`] – the [`SessionTransport`][transport::SessionTransport] and
//!   [`Connector`][transport::Connector] traits: "send, wait a fixed delay,
//!   drain whatever is buffered" is the only operation a session offers.
//! - [`telnet`] – [`TelnetConnector`][telnet::TelnetConnector], the TCP
//!   implementation used against real devices.
//! - [`sanitize`] – strips ANSI escapes and non-printable bytes from replies.
//! - [`extract`] – label-based field extraction with documented defaults.
//! - [`navigator`] – [`MenuNavigator`][navigator::MenuNavigator], the fixed
//!   command script that walks the menu down to the RPSU board dump.
//! - [`sim`] – scripted in-process console for tests without hardware.
//!
//! # Timing
//!
//! The console never signals that a reply is complete. Every command is
//! followed by an unconditional sleep and a best-effort drain; a reply that
//! arrives after the drain is simply lost for that cycle.

pub mod extract;
pub mod navigator;
pub mod sanitize;
pub mod sim;
pub mod telnet;
pub mod transport;

pub use extract::{extract_rpsu_status, extract_temperature, extract_uptime, extract_value};
pub use navigator::MenuNavigator;
pub use sanitize::sanitize;
pub use telnet::{TelnetConnector, TelnetSession};
pub use transport::{Connector, SessionTransport};
