//! [`DevicePoller`] – one long-lived worker per device.
//!
//! # Loop
//!
//! ```text
//! Connecting ─► Navigating ─► Emitting ─► Sleeping ─┐
//!     ▲                                              │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! Every cycle ends in exactly one [`PollOutcome`]. Whatever it is, the
//! poller then sleeps the full configured interval: there is no backoff, and
//! a device that keeps failing is polled exactly as often as a healthy one.
//!
//! The loop only ends through its [`CancellationToken`], which is observed
//! both while a cycle is in flight and while sleeping. Cancelling mid-cycle
//! drops the session, which closes the connection.

use std::sync::Arc;
use std::time::Duration;

use rpsu_console::{Connector, MenuNavigator};
use rpsu_journal::ReadingSink;
use rpsu_middleware::EventBus;
use rpsu_types::{Device, PollEvent, PollOutcome, RpsuError, SessionState};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::settings::PollSettings;

/// Default time allowed for the TCP connect of each cycle.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a poller shares with its siblings. All of it is read-only or
/// internally synchronised.
#[derive(Clone)]
pub struct PollerContext {
    pub connector: Arc<dyn Connector>,
    pub navigator: Arc<MenuNavigator>,
    pub sink: Arc<dyn ReadingSink>,
    pub bus: EventBus,
    pub settings: watch::Receiver<PollSettings>,
    pub connect_timeout: Duration,
}

/// Polls one device until cancelled.
pub struct DevicePoller {
    device: Device,
    ctx: PollerContext,
    state: SessionState,
    cycle: u64,
}

impl DevicePoller {
    /// `device` is fixed for the life of the poller; an edit means a new
    /// poller.
    pub fn new(device: Device, ctx: PollerContext) -> Self {
        Self {
            device,
            ctx,
            state: SessionState::Disconnected,
            cycle: 0,
        }
    }

    /// Where the session of the current (or last) cycle is.
    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(device = %self.device, "poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }

            // Read fresh so a changed interval applies from this sleep on.
            let interval = self.ctx.settings.borrow().interval;
            debug!(device = %self.device.name, ?interval, "sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        self.state = SessionState::Disconnected;
        info!(device = %self.device.name, cycles = self.cycle, "poller stopped");
    }

    /// One complete cycle: connect, navigate, close, record and publish.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.cycle += 1;
        let span = info_span!(
            "poll_cycle",
            device = %self.device.name,
            address = %self.device.address,
            cycle = self.cycle,
        );
        async {
            let started = Instant::now();
            let outcome = self.collect().await;
            self.emit(&outcome);
            info!(
                outcome = ?outcome.indicator(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "cycle finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn collect(&mut self) -> PollOutcome {
        self.state = SessionState::Disconnected;
        let mut session = match self
            .ctx
            .connector
            .open(&self.device.address, self.device.port, self.ctx.connect_timeout)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "no link");
                return PollOutcome::NoLink;
            }
        };
        self.state = SessionState::Connected;

        let result = self
            .ctx
            .navigator
            .navigate(session.as_mut(), &mut self.state)
            .await;
        session.close().await;
        self.state = SessionState::Disconnected;

        match result {
            Ok(reading) => PollOutcome::Success(reading),
            Err(RpsuError::SubmenuNotFound { board }) => {
                warn!(board = %board, "RPSU board not found");
                PollOutcome::NoSubmenu
            }
            Err(e) => {
                warn!(error = %e, "cycle failed");
                PollOutcome::CycleError
            }
        }
    }

    fn emit(&self, outcome: &PollOutcome) {
        if let PollOutcome::Success(reading) = outcome {
            let shifted = self.ctx.settings.borrow().shifted_journal;
            if let Err(e) = self.ctx.sink.record(&self.device.name, reading, shifted) {
                warn!(error = %e, "journal write failed");
            }
            if reading.temperature_alert() {
                warn!(temperature = ?reading.temperature_c(), "temperature above threshold");
            }
        }
        let delivered = self
            .ctx
            .bus
            .publish(PollEvent::from_outcome(self.device.name.clone(), outcome));
        debug!(delivered, "outcome published");
    }
}
