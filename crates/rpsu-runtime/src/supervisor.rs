//! [`PollingSupervisor`] – owns the set of running pollers.
//!
//! The supervisor is handed the device list at startup and after every
//! registry change. [`reconcile`][PollingSupervisor::reconcile] then brings
//! the running set in line with it:
//!
//! - devices no longer listed have their poller cancelled,
//! - devices whose address or port changed get a fresh poller,
//! - new devices get a poller,
//! - everything else is left alone, so reconciling twice changes nothing.
//!
//! At most [`EngineProfile::max_devices`] pollers run; later entries are
//! ignored with a warning.
//!
//! Each poller gets a child of the supervisor's root [`CancellationToken`],
//! so [`shutdown`][PollingSupervisor::shutdown] stops all of them at once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rpsu_console::{Connector, MenuNavigator};
use rpsu_journal::ReadingSink;
use rpsu_middleware::EventBus;
use rpsu_types::{Device, EngineProfile, RpsuError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::poller::{DEFAULT_CONNECT_TIMEOUT, DevicePoller, PollerContext};
use crate::settings::{PollSettings, interval_from_minutes};

struct Worker {
    device: Device,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// What a [`PollingSupervisor::reconcile`] call changed, by device name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    /// Listed devices left unpolled because of the cap or a duplicate name.
    pub skipped: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.restarted.is_empty()
            && self.stopped.is_empty()
            && self.skipped.is_empty()
    }
}

pub struct PollingSupervisor {
    profile: EngineProfile,
    connector: Arc<dyn Connector>,
    navigator: Arc<MenuNavigator>,
    sink: Arc<dyn ReadingSink>,
    bus: EventBus,
    settings: watch::Sender<PollSettings>,
    connect_timeout: Duration,
    root: CancellationToken,
    workers: Vec<Worker>,
    /// Stopped pollers that may still be finishing; joined on shutdown.
    retired: Vec<JoinHandle<()>>,
}

impl PollingSupervisor {
    pub fn new(
        profile: EngineProfile,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn ReadingSink>,
        bus: EventBus,
        settings: PollSettings,
    ) -> Self {
        let (settings, _) = watch::channel(settings);
        Self {
            navigator: Arc::new(MenuNavigator::new(profile.clone())),
            profile,
            connector,
            sink,
            bus,
            settings,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            root: CancellationToken::new(),
            workers: Vec::new(),
            retired: Vec::new(),
        }
    }

    /// Override the per-cycle connect timeout (builder-style).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> PollSettings {
        *self.settings.borrow()
    }

    /// Change the interval; pollers pick it up at their next sleep.
    ///
    /// # Errors
    ///
    /// [`RpsuError::Config`] for a value outside the allowed set.
    pub fn set_interval_minutes(&self, minutes: u64) -> Result<(), RpsuError> {
        let interval = interval_from_minutes(minutes)?;
        self.settings.send_modify(|s| s.interval = interval);
        info!(minutes, "polling interval changed");
        Ok(())
    }

    /// Toggle the shifted journal; applies from the next write.
    pub fn set_shifted_journal(&self, enabled: bool) {
        self.settings.send_modify(|s| s.shifted_journal = enabled);
        info!(enabled, "shifted journal toggled");
    }

    /// Devices currently being polled, in registry order.
    pub fn running(&self) -> Vec<Device> {
        self.workers.iter().map(|w| w.device.clone()).collect()
    }

    /// Bring the running pollers in line with `devices`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reconcile(&mut self, devices: &[Device]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut wanted: Vec<Device> = Vec::new();
        let mut names = HashSet::new();
        for device in devices {
            if !names.insert(device.name.as_str()) {
                warn!(device = %device.name, "duplicate device name ignored");
                report.skipped.push(device.name.clone());
            } else if wanted.len() >= self.profile.max_devices {
                warn!(
                    device = %device.name,
                    max = self.profile.max_devices,
                    "device cap reached, not polling"
                );
                report.skipped.push(device.name.clone());
            } else {
                wanted.push(device.clone());
            }
        }

        let mut kept = Vec::with_capacity(wanted.len());
        for worker in std::mem::take(&mut self.workers) {
            match wanted.iter().find(|d| d.name == worker.device.name) {
                Some(device) if *device == worker.device => kept.push(worker),
                Some(_) => {
                    report.restarted.push(worker.device.name.clone());
                    self.retire(worker);
                }
                None => {
                    report.stopped.push(worker.device.name.clone());
                    self.retire(worker);
                }
            }
        }

        // Rebuild in registry order, reusing untouched workers.
        for device in wanted {
            let position = kept.iter().position(|w| w.device.name == device.name);
            match position {
                Some(i) => self.workers.push(kept.swap_remove(i)),
                None => {
                    if !report.restarted.contains(&device.name) {
                        report.started.push(device.name.clone());
                    }
                    let worker = self.spawn(device);
                    self.workers.push(worker);
                }
            }
        }

        if !report.is_empty() {
            info!(
                started = report.started.len(),
                restarted = report.restarted.len(),
                stopped = report.stopped.len(),
                skipped = report.skipped.len(),
                running = self.workers.len(),
                "pollers reconciled"
            );
        }
        report
    }

    /// Cancel every poller and wait for all of them to finish.
    pub async fn shutdown(mut self) {
        self.root.cancel();
        let handles = self
            .workers
            .drain(..)
            .map(|w| w.handle)
            .chain(self.retired.drain(..));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
        info!("all pollers stopped");
    }

    fn spawn(&self, device: Device) -> Worker {
        let cancel = self.root.child_token();
        let ctx = PollerContext {
            connector: self.connector.clone(),
            navigator: self.navigator.clone(),
            sink: self.sink.clone(),
            bus: self.bus.clone(),
            settings: self.settings.subscribe(),
            connect_timeout: self.connect_timeout,
        };
        let handle = tokio::spawn(DevicePoller::new(device.clone(), ctx).run(cancel.clone()));
        Worker {
            device,
            cancel,
            handle,
        }
    }

    fn retire(&mut self, worker: Worker) {
        worker.cancel.cancel();
        self.retired.retain(|h| !h.is_finished());
        self.retired.push(worker.handle);
    }
}

#[cfg(test)]
mod tests {
    use rpsu_console::sim::{SimConnector, SimConsole};
    use rpsu_journal::CsvJournal;
    use rpsu_middleware::Topic;
    use rpsu_types::PollPayload;

    use super::*;

    fn supervisor(connector: SimConnector, journal_dir: &std::path::Path) -> PollingSupervisor {
        PollingSupervisor::new(
            EngineProfile::full(),
            Arc::new(connector),
            Arc::new(CsvJournal::new(journal_dir, true)),
            EventBus::default(),
            PollSettings::default(),
        )
    }

    fn names(devices: &[Device]) -> Vec<&str> {
        devices.iter().map(|d| d.name.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_starts_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut sup = supervisor(SimConnector::unreachable(), dir.path());
        let devices = vec![Device::new("A", "10.0.0.1"), Device::new("B", "10.0.0.2")];

        let first = sup.reconcile(&devices);
        assert_eq!(first.started, vec!["A", "B"]);
        assert_eq!(names(&sup.running()), vec!["A", "B"]);

        let second = sup.reconcile(&devices);
        assert!(second.is_empty(), "unexpected changes: {second:?}");
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_never_exceeds_cap() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut sup = supervisor(SimConnector::unreachable(), dir.path());
        let devices: Vec<Device> = (0..7)
            .map(|i| Device::new(format!("D{i}"), format!("10.0.0.{i}")))
            .collect();

        let report = sup.reconcile(&devices);
        assert_eq!(sup.running().len(), sup.profile().max_devices);
        assert_eq!(report.skipped, vec!["D5", "D6"]);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_names_run_once() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut sup = supervisor(SimConnector::unreachable(), dir.path());
        let devices = vec![Device::new("A", "10.0.0.1"), Device::new("A", "10.0.0.9")];

        let report = sup.reconcile(&devices);
        assert_eq!(report.started, vec!["A"]);
        assert_eq!(report.skipped, vec!["A"]);
        assert_eq!(sup.running()[0].address, "10.0.0.1");
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removal_stops_and_edit_restarts() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut sup = supervisor(SimConnector::unreachable(), dir.path());
        sup.reconcile(&[
            Device::new("A", "10.0.0.1"),
            Device::new("B", "10.0.0.2"),
            Device::new("C", "10.0.0.3"),
        ]);

        let report = sup.reconcile(&[
            Device::new("C", "10.0.0.3"),
            Device::new("A", "10.0.0.1").with_port(2323),
        ]);
        assert_eq!(report.stopped, vec!["B"]);
        assert_eq!(report.restarted, vec!["A"]);
        assert!(report.started.is_empty());
        assert_eq!(names(&sup.running()), vec!["C", "A"]);
        assert_eq!(sup.running()[1].port, 2323);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn settings_are_validated_and_shared() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sup = supervisor(SimConnector::unreachable(), dir.path());
        assert!(sup.set_interval_minutes(7).is_err());
        sup.set_interval_minutes(15).unwrap();
        sup.set_shifted_journal(true);
        assert_eq!(
            sup.settings(),
            PollSettings::new(Duration::from_secs(900), true)
        );
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pollers_journal_and_publish_until_shutdown() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let console = SimConsole::healthy();
        let mut sup = supervisor(SimConnector::new(console), dir.path());
        sup.set_shifted_journal(true);
        let mut telemetry = sup.bus().subscribe_to(Topic::Telemetry);

        sup.reconcile(&[Device::new("Rack A", "10.0.0.7")]);
        let event = telemetry.recv().await.unwrap();
        assert_eq!(event.device, "Rack A");
        assert!(matches!(event.payload, PollPayload::Reading { alert: false, .. }));
        sup.shutdown().await;

        let journal = CsvJournal::new(dir.path(), true);
        let last = journal.last_record("Rack A").unwrap().expect("row written");
        assert_eq!(last.voltage(), "53.6");
        assert!(journal.shifted_path("Rack A").exists());
    }
}
