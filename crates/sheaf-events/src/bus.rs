use tokio::sync::broadcast;

use crate::Event;

/// Broadcast bus shared by everything belonging to one player.
///
/// `publish()` is synchronous and safe from the load threads. Events
/// published with no subscriber are dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish anything convertible into [`Event`], e.g.
    /// `bus.publish(TrackEvent::DownstreamFormatChanged { .. })`.
    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// Independent receiver of all future events. Slow receivers see
    /// `RecvError::Lagged` instead of blocking publishers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use sheaf_core::{Format, SelectionReason, TrackType};

    use super::*;
    use crate::TrackEvent;

    fn format_changed(media_time_us: i64) -> TrackEvent {
        TrackEvent::DownstreamFormatChanged {
            track_type: TrackType::Video,
            format: Format::new().with_id("720p"),
            selection_reason: SelectionReason::Adaptive,
            media_time_us,
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(format_changed(0));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(format_changed(5_000_000));

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert!(matches!(
                event,
                Event::Track(TrackEvent::DownstreamFormatChanged {
                    media_time_us: 5_000_000,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..10 {
            bus.publish(format_changed(i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.clone().publish(format_changed(1));
        assert!(rx.try_recv().is_ok());
    }
}
