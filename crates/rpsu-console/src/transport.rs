//! Session traits shared by the real telnet transport and the simulator.
//!
//! The menu script only ever needs one primitive: write a command, wait a
//! fixed delay, then take whatever the device has sent so far. Keeping that
//! behind [`SessionTransport`] lets the navigator run unchanged against
//! [`TelnetSession`][crate::telnet::TelnetSession] and
//! [`SimConsole`][crate::sim::SimConsole].

use std::time::Duration;

use async_trait::async_trait;
use rpsu_types::RpsuError;

/// Line terminator appended to every command.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// One open console session, exclusively owned by one poller.
#[async_trait]
pub trait SessionTransport: Send {
    /// Write `command` followed by CRLF, sleep `wait` unconditionally, then
    /// return every byte currently buffered, decoded as ASCII.
    ///
    /// The reply may be empty or truncated; there is no completion marker.
    ///
    /// # Errors
    ///
    /// Returns [`RpsuError::Transport`] when the write fails or the peer
    /// has closed the connection.
    async fn send(&mut self, command: &str, wait: Duration) -> Result<String, RpsuError>;

    /// Release the connection. Never fails, and may be called repeatedly or
    /// on a session that already broke.
    async fn close(&mut self);
}

/// Opens sessions to devices.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `address:port`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RpsuError::ConnectFailed`] when no session could be opened.
    async fn open(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn SessionTransport>, RpsuError>;
}
