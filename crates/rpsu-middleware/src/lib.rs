//! `rpsu-middleware` – hand-off between pollers and presentation.
//!
//! Pollers run on their own tasks and must never wait for whatever shows
//! their results. They publish [`PollEvent`][rpsu_types::PollEvent]s here and
//! move on; presenters subscribe and consume at their own pace.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
