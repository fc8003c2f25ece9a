//! In-process console simulator for tests without physical devices.
//!
//! [`SimConsole`] answers each command from a script of canned replies and
//! records every command it receives, so tests can assert both on the parsed
//! [`Reading`][rpsu_types::Reading] and on the exact command sequence.
//! [`SimConnector`] hands out fresh sessions from a template console, or
//! refuses every connection to model an unreachable device.
//!
//! Delays are honoured with `tokio::time::sleep`, so tests running on a
//! paused clock observe the same timing a real device would impose.
//!
//! # Example
//!
//! ```rust
//! use rpsu_console::sim::{SimConnector, SimConsole};
//!
//! let console = SimConsole::healthy().reply("ECHO", "01 02 03");
//! let connector = SimConnector::new(console.clone());
//! assert_eq!(connector.open_count(), 0);
//! assert!(console.commands().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rpsu_types::RpsuError;

use crate::transport::{Connector, SessionTransport};

// ────────────────────────────────────────────────────────────────────────────
// Scripted session
// ────────────────────────────────────────────────────────────────────────────

/// A scripted console session.
///
/// Clones share the command log and close counter, which lets a test keep a
/// handle while the session itself is moved into a poller.
#[derive(Clone, Default)]
pub struct SimConsole {
    replies: HashMap<String, String>,
    fail_on: Option<String>,
    log: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl SimConsole {
    /// A console that answers every command with an empty reply.
    pub fn new() -> Self {
        Self::default()
    }

    /// A console with a present RPSU board reporting `ON` at 27.5 °C.
    ///
    /// Replies carry the colour codes and cursor moves a real console emits.
    pub fn healthy() -> Self {
        Self::new()
            .reply("2", "\x1b[2J\x1b[1;1HDEVICE MENU\r\n1. Boards\r\n2. Status\r\n> ")
            .reply(
                "STATUS",
                "\x1b[1mSYSTEM STATUS\x1b[0m\r\nFan: OK\r\nTemperature : 27.50 C\r\n> ",
            )
            .reply("%1", "BOARD CONTEXT\r\n> ")
            .reply("ECHO", "\x1b[32mBoards: 01 02 04 07\x1b[0m\r\n> ")
            .reply("%104", "RPSU SELECTED\r\n> ")
            .reply("1", "RPSU MENU\r\n> ")
            .reply(
                "SHOW",
                "\x1b[33mRPSU Status=ON\x1b[0m\r\nRPSU Uptime=87 Hours\r\n\
                 Voltage: 53.6\r\nCurrent: 1250\r\nLeak Current: 3\r\n> ",
            )
    }

    /// Answer `command` with `text`, replacing any earlier reply.
    pub fn reply(mut self, command: impl Into<String>, text: impl Into<String>) -> Self {
        self.replies.insert(command.into(), text.into());
        self
    }

    /// Fail with a transport error when `command` is sent.
    pub fn fail_on(mut self, command: impl Into<String>) -> Self {
        self.fail_on = Some(command.into());
        self
    }

    /// Every command received so far, across all clones, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// How many sessions sharing this log have been closed.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for SimConsole {
    async fn send(&mut self, command: &str, wait: Duration) -> Result<String, RpsuError> {
        if self.closed {
            return Err(RpsuError::Transport("simulated session is closed".into()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(command.to_string());
        }
        if self.fail_on.as_deref() == Some(command) {
            self.closed = true;
            return Err(RpsuError::Transport(format!(
                "simulated connection reset on {command:?}"
            )));
        }
        tokio::time::sleep(wait).await;
        Ok(self.replies.get(command).cloned().unwrap_or_default())
    }

    async fn close(&mut self) {
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connector
// ────────────────────────────────────────────────────────────────────────────

/// Opens [`SimConsole`] sessions, or none at all when unreachable.
#[derive(Clone)]
pub struct SimConnector {
    template: Option<SimConsole>,
    opens: Arc<AtomicUsize>,
}

impl SimConnector {
    /// Every `open` yields a fresh clone of `console`.
    pub fn new(console: SimConsole) -> Self {
        Self {
            template: Some(console),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `open` fails with [`RpsuError::ConnectFailed`].
    pub fn unreachable() -> Self {
        Self {
            template: None,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of connection attempts, successful or not.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SimConnector {
    async fn open(
        &self,
        address: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn SessionTransport>, RpsuError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.template {
            Some(console) => {
                let mut session = console.clone();
                session.closed = false;
                Ok(Box::new(session))
            }
            None => Err(RpsuError::ConnectFailed {
                address: address.to_string(),
                port,
                details: "simulated host unreachable".to_string(),
            }),
        }
    }
}
