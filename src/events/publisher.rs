use tokio::sync::broadcast;

use crate::degradation::HealthState;

/// High-throughput publisher for service health transitions
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<HealthTransition>,
}

/// A service moving from one health state to another
#[derive(Debug, Clone)]
pub struct HealthTransition {
    pub service: String,
    pub from: HealthState,
    pub to: HealthState,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a health transition.
    ///
    /// A broadcast send fails only when there are no subscribers, which is
    /// acceptable here - transitions are still observable via the manager's
    /// snapshot API.
    pub fn publish(&self, service: impl Into<String>, from: HealthState, to: HealthState) {
        let transition = HealthTransition {
            service: service.into(),
            from,
            to,
            occurred_at: chrono::Utc::now(),
        };

        let _ = self.sender.send(transition);
    }

    /// Subscribe to health transitions
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish("redis", HealthState::Healthy, HealthState::Unavailable);

        let transition = rx.recv().await.unwrap();
        assert_eq!(transition.service, "redis");
        assert_eq!(transition.from, HealthState::Healthy);
        assert_eq!(transition.to, HealthState::Unavailable);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        publisher.publish("twitch_api", HealthState::Healthy, HealthState::Degraded);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
