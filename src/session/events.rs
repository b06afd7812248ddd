//! Lifecycle notifications

use super::Session;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

/// A state change of a workspace, carrying the affected record
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Created { session: Session },
    Recycled { session: Session },
    Renamed { session: Session, old_name: String },
    Deleted { session: Session },
    Corrupted { session: Session },
}

impl SessionEvent {
    pub fn session(&self) -> &Session {
        match self {
            SessionEvent::Created { session }
            | SessionEvent::Recycled { session }
            | SessionEvent::Renamed { session, .. }
            | SessionEvent::Deleted { session }
            | SessionEvent::Corrupted { session } => session,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Created { .. } => "created",
            SessionEvent::Recycled { .. } => "recycled",
            SessionEvent::Renamed { .. } => "renamed",
            SessionEvent::Deleted { .. } => "deleted",
            SessionEvent::Corrupted { .. } => "corrupted",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        let session = self.session();
        match self {
            SessionEvent::Renamed { old_name, .. } => format!(
                "Session {} renamed from '{}' to '{}'",
                session.id, old_name, session.name
            ),
            _ => format!("Session {} ({}) {}", session.id, session.name, self.kind()),
        }
    }
}

/// Fire-and-forget sink for lifecycle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SessionEvent);
}

pub struct NoOpPublisher;

#[async_trait]
impl EventPublisher for NoOpPublisher {
    async fn publish(&self, _event: SessionEvent) {}
}

/// Logs each event at info level
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: SessionEvent) {
        tracing::info!(
            session_id = %event.session().id,
            event = event.kind(),
            "{}",
            event.description()
        );
    }
}

/// Fans events out to any number of subscribers.
///
/// Publishing with no subscribers is not an error; slow subscribers miss
/// events once `capacity` is exceeded.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for session event");
        }
    }
}
