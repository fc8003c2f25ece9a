//! Topic-based publish/subscribe bus for poll results.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message and a slow subscriber only ever hurts itself: it lags and
//! loses old events, it never blocks a poller.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::DeviceStatus`] | Every cycle outcome, reading or indicator |
//! | [`Topic::Telemetry`] | Successful readings only |
//! | [`Topic::Alerts`] | Readings whose temperature exceeds the threshold |

use rpsu_types::{PollEvent, PollPayload};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every outcome of every cycle.
    DeviceStatus,
    /// Successful readings.
    Telemetry,
    /// Readings with the temperature alert raised.
    Alerts,
}

impl Topic {
    /// Lanes `event` is delivered to.
    pub fn routes(event: &PollEvent) -> Vec<Topic> {
        match &event.payload {
            PollPayload::Reading { alert: true, .. } => {
                vec![Topic::DeviceStatus, Topic::Telemetry, Topic::Alerts]
            }
            PollPayload::Reading { alert: false, .. } => {
                vec![Topic::DeviceStatus, Topic::Telemetry]
            }
            PollPayload::Indicator(_) => vec![Topic::DeviceStatus],
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    device_status: broadcast::Sender<PollEvent>,
    telemetry: broadcast::Sender<PollEvent>,
    alerts: broadcast::Sender<PollEvent>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (device_status, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            device_status,
            telemetry,
            alerts,
        }
    }

    /// Publish `event` to one topic.
    ///
    /// Returns how many receivers were handed the event. Nobody listening is
    /// normal and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: PollEvent) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                trace!(?topic, device = %event.device, "no subscribers");
                0
            }
        }
    }

    /// Publish `event` on every topic it routes to (see [`Topic::routes`]).
    ///
    /// Fire-and-forget: never blocks, never fails. Returns the total number
    /// of deliveries across topics.
    pub fn publish(&self, event: PollEvent) -> usize {
        Topic::routes(&event)
            .into_iter()
            .map(|topic| self.publish_to(topic, event.clone()))
            .sum()
    }

    /// Subscribe to one topic.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<PollEvent> {
        match topic {
            Topic::DeviceStatus => &self.device_status,
            Topic::Telemetry => &self.telemetry,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<PollEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<PollEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<PollEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Like [`recv`][Self::recv] but skips over lag, logging it.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use rpsu_types::{DeviceIndicator, PollOutcome, Reading, RpsuStatus};

    fn reading_event(device: &str, temperature: &str) -> PollEvent {
        let reading = Reading::builder(Local::now())
            .status(RpsuStatus::On)
            .temperature_c(Some(temperature.to_string()))
            .build();
        PollEvent::from_outcome(device, &PollOutcome::Success(reading))
    }

    #[tokio::test]
    async fn status_subscribers_see_every_outcome() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut status = bus.subscribe_to(Topic::DeviceStatus);

        bus.publish(PollEvent::from_outcome("Rack A", &PollOutcome::NoLink));
        bus.publish(reading_event("Rack B", "25.0"));

        let first = status.recv().await?;
        assert_eq!(first.device, "Rack A");
        assert!(matches!(
            first.payload,
            PollPayload::Indicator(DeviceIndicator::NoLink)
        ));
        assert_eq!(status.recv().await?.device, "Rack B");
        Ok(())
    }

    #[tokio::test]
    async fn alerts_only_carry_hot_readings() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let mut telemetry = bus.subscribe_to(Topic::Telemetry);

        bus.publish(reading_event("cool", "30.0"));
        bus.publish(PollEvent::from_outcome("down", &PollOutcome::CycleError));
        let hot = reading_event("hot", "41.0");
        bus.publish(hot.clone());

        assert_eq!(alerts.recv().await?.id, hot.id);
        assert!(alerts.try_recv().is_err());
        assert_eq!(telemetry.recv().await?.device, "cool");
        assert_eq!(telemetry.recv().await?.device, "hot");
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::DeviceStatus);
        let mut rx2 = bus.subscribe_to(Topic::DeviceStatus);

        let event = reading_event("Rack A", "20.0");
        assert_eq!(bus.publish_to(Topic::DeviceStatus, event.clone()), 2);

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(reading_event("Rack A", "45.0")), 0);
    }

    #[test]
    fn routes_follow_payload() {
        let indicator = PollEvent::from_outcome("x", &PollOutcome::NoSubmenu);
        assert_eq!(Topic::routes(&indicator), vec![Topic::DeviceStatus]);
        assert_eq!(Topic::routes(&reading_event("x", "41.0")).len(), 3);
    }

    /// Flooding a small channel while a subscriber sleeps yields `Lagged`
    /// rather than blocking the publisher.
    #[tokio::test]
    async fn slow_subscriber_lags_and_recovers() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::DeviceStatus);

        for _ in 0..100 {
            bus.publish_to(
                Topic::DeviceStatus,
                PollEvent::from_outcome("flood", &PollOutcome::NoLink),
            );
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
        assert!(slow.next_event().await.is_some());
    }

    #[tokio::test]
    async fn next_event_ends_when_bus_is_dropped() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Telemetry);
        drop(bus);
        assert!(rx.next_event().await.is_none());
        assert_eq!(rx.topic(), Topic::Telemetry);
    }
}
