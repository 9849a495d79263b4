//! Lifecycle notifications for UI layers.
//!
//! Notifications are fire-and-forget: a notifier never blocks and never
//! fails the operation that emitted it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Name of the startup progress channel.
pub const STARTUP_PHASE: &str = "startup.phase";

const BROADCAST_CAPACITY: usize = 32;

/// An event emitted while driving a connector's API lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name")]
pub enum LifecycleEvent {
    /// Progress of an API startup.
    #[serde(rename = "startup.phase")]
    StartupPhase {
        /// Human-readable progress trace.
        trace: String,
    },
}

impl LifecycleEvent {
    /// A startup progress event.
    #[must_use]
    pub fn startup_phase(trace: impl Into<String>) -> Self {
        Self::StartupPhase {
            trace: trace.into(),
        }
    }

    /// The channel name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartupPhase { .. } => STARTUP_PHASE,
        }
    }
}

/// A sink for lifecycle events.
pub trait LifecycleNotifier: Send + Sync {
    /// Deliver `event`. Must not block.
    fn transmit(&self, event: LifecycleEvent);
}

/// Notifier that records events in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl LifecycleNotifier for TracingNotifier {
    fn transmit(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::StartupPhase { trace } => {
                info!(target: "podbridge::notify", name = event.name(), %trace, "lifecycle event");
            }
        }
    }
}

/// Notifier that fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastNotifier {
    /// Creates a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribes to events transmitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleNotifier for BroadcastNotifier {
    fn transmit(&self, event: LifecycleEvent) {
        if self.sender.send(event).is_err() {
            debug!(target: "podbridge::notify", "no lifecycle subscribers");
        }
    }
}
