//! Notifications the monitor publishes for whoever observes it. Publishing never blocks:
//! when the channel is full or nobody listens the event is dropped.

pub mod module;
pub mod status;

use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver};
use tracing::{debug, error, trace};

use crate::{
    daemon::{blocking::BlockLevel, classifier::Category},
    window_api::AppIdentity,
};

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    CategoryChanged {
        identity: AppIdentity,
        category: Category,
    },
    FocusLost,
    PointsUpdated {
        delta: i64,
        current_points: u64,
    },
    /// An entertainment app was used with no points left.
    BlockedAppAccess {
        identity: AppIdentity,
    },
    BlockApplied {
        identity: AppIdentity,
        level: BlockLevel,
    },
    BlockReleased {
        process_name: String,
    },
    MonitoringStopped {
        reason: String,
    },
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: Option<mpsc::Sender<MonitorEvent>>,
}

impl EventPublisher {
    pub fn new(sender: mpsc::Sender<MonitorEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Publisher without subscribers.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn channel() -> (Self, Receiver<MonitorEvent>) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self::new(sender), receiver)
    }

    pub fn publish(&self, event: MonitorEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event channel is full, dropping {event:?}"),
            Err(TrySendError::Closed(event)) => trace!("No event subscribers, dropping {event:?}"),
        }
    }
}

/// Drains the event channel into a processor until every publisher is gone.
pub struct EventModule<Processor> {
    receiver: Receiver<MonitorEvent>,
    processor: Processor,
}

impl<P: EventProcessor> EventModule<P> {
    pub fn new(receiver: Receiver<MonitorEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            if let Err(e) = self.processor.process_next(event.clone()).await {
                error!("Error processing event {:?}: {e:?}", event)
            }
        }

        self.receiver.close();
        self.processor.finalize().await
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{EventPublisher, MonitorEvent};

    #[tokio::test]
    async fn test_full_channel_drops_events() {
        let (sender, mut receiver) = mpsc::channel(1);
        let publisher = EventPublisher::new(sender);

        publisher.publish(MonitorEvent::FocusLost);
        publisher.publish(MonitorEvent::PointsUpdated {
            delta: 1,
            current_points: 1,
        });

        assert_eq!(receiver.recv().await, Some(MonitorEvent::FocusLost));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (publisher, receiver) = EventPublisher::channel();
        drop(receiver);
        publisher.publish(MonitorEvent::FocusLost);
        EventPublisher::disabled().publish(MonitorEvent::FocusLost);
    }
}
