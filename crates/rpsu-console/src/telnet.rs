//! Raw TCP remote-terminal transport.
//!
//! No option negotiation is performed. Telnet command sequences (`IAC …`)
//! that the device volunteers are removed from the drained bytes so they do
//! not leak into the text, and whatever is left is decoded as ASCII with
//! non-ASCII bytes dropped.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use rpsu_types::RpsuError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::transport::{COMMAND_TERMINATOR, Connector, SessionTransport};

/// Upper bound on a single drained reply. A status dump is a few KiB.
pub const MAX_REPLY_BYTES: usize = 64 * 1024;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Opens [`TelnetSession`]s over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelnetConnector;

impl TelnetConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TelnetConnector {
    async fn open(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn SessionTransport>, RpsuError> {
        let connect_failed = |details: String| RpsuError::ConnectFailed {
            address: address.to_string(),
            port,
            details,
        };

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(connect_failed(e.to_string())),
            Err(_) => return Err(connect_failed(format!("timed out after {timeout:?}"))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(address, port, error = %e, "could not disable Nagle");
        }
        debug!(address, port, "session opened");

        Ok(Box::new(TelnetSession {
            peer: format!("{address}:{port}"),
            stream: Some(stream),
        }))
    }
}

/// A connection to one console. The stream is dropped once the session
/// is closed or breaks.
pub struct TelnetSession {
    peer: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl SessionTransport for TelnetSession {
    async fn send(&mut self, command: &str, wait: Duration) -> Result<String, RpsuError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(RpsuError::Transport(format!(
                "session to {} is closed",
                self.peer
            )));
        };

        let mut frame = Vec::with_capacity(command.len() + COMMAND_TERMINATOR.len());
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(COMMAND_TERMINATOR);
        if let Err(e) = stream.write_all(&frame).await {
            self.stream = None;
            return Err(RpsuError::Transport(format!(
                "write of {command:?} to {} failed: {e}",
                self.peer
            )));
        }

        tokio::time::sleep(wait).await;

        let (raw, eof) = match drain_available(stream) {
            Ok(drained) => drained,
            Err(e) => {
                self.stream = None;
                return Err(RpsuError::Transport(format!(
                    "read from {} failed: {e}",
                    self.peer
                )));
            }
        };
        if eof {
            self.stream = None;
            if raw.is_empty() {
                return Err(RpsuError::Transport(format!(
                    "{} closed the connection",
                    self.peer
                )));
            }
        }

        let text = decode_ascii(&strip_telnet_commands(&raw));
        debug!(peer = %self.peer, command, bytes = raw.len(), "drained reply");
        Ok(text)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.peer, error = %e, "shutdown on close failed");
            }
        }
    }
}

/// Non-blocking drain of everything the socket has buffered.
///
/// At most [`MAX_REPLY_BYTES`] are kept; the rest is read and discarded so
/// the next command's reply starts clean. Returns the bytes and whether the
/// peer signalled end-of-stream.
fn drain_available(stream: &TcpStream) -> io::Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    let mut discarded = 0usize;
    let eof = loop {
        match stream.try_read(&mut buf) {
            Ok(0) => break true,
            Ok(n) => {
                let keep = n.min(MAX_REPLY_BYTES - out.len());
                out.extend_from_slice(&buf[..keep]);
                discarded += n - keep;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    if discarded > 0 {
        warn!(kept = out.len(), discarded, "reply exceeds limit, tail dropped");
    }
    Ok((out, eof))
}

/// Remove `IAC` command sequences; an escaped `IAC IAC` yields one 0xFF.
pub(crate) fn strip_telnet_commands(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != IAC {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        match raw.get(i + 1).copied() {
            Some(IAC) => {
                out.push(IAC);
                i += 2;
            }
            Some(cmd) if (WILL..=DONT).contains(&cmd) => i += 3,
            Some(SB) => {
                // Skip to the matching IAC SE, or to the end if it never came.
                let mut j = i + 2;
                while j + 1 < raw.len() && !(raw[j] == IAC && raw[j + 1] == SE) {
                    j += 1;
                }
                i = j + 2;
            }
            Some(_) => i += 2,
            None => i += 1,
        }
    }
    out
}

/// ASCII decode that silently drops non-ASCII bytes.
fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}
