use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-venue reservation notifications.
///
/// The engine publishes strictly post-commit: an event is sent only after
/// it has been WAL-appended and applied. Who listens and what they do with
/// it (mail, dashboards, wire NOTIFY) is outside the engine.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a venue. Creates the channel if needed.
    pub fn subscribe(&self, venue: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(venue.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, venue: &str, event: &Event) {
        if let Some(sender) = self.channels.get(venue) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a venue's last reservation is purged).
    #[allow(dead_code)]
    pub fn remove(&self, venue: &str) {
        self.channels.remove(venue);
    }
}
