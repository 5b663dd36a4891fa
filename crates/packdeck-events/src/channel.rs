//! Per-pack progress channels.
//!
//! Every pack id maps to one logical channel named by
//! [`progress_channel_name`]. Subscribers register against that name and
//! receive [`ProgressEvent`]s in the order they were published. Events for a
//! channel without live subscribers are dropped, so callers must subscribe
//! before starting the work that emits them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::payloads::{DownloadStage, PackId, ProgressEvent};
use crate::topics::progress_channel_name;

/// Identifier of one live subscription.
pub type SubscriptionId = u64;

/// Registry of named per-pack progress streams.
#[derive(Clone, Default)]
pub struct ProgressChannel {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

struct Subscriber {
    channel: String,
    sender: UnboundedSender<ProgressEvent>,
}

impl ProgressChannel {
    /// Construct an empty channel registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin delivery of progress events for `pack_id` to the returned handle.
    #[must_use]
    pub fn subscribe(&self, pack_id: PackId) -> ProgressSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = progress_channel_name(pack_id);
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.insert(
            id,
            Subscriber {
                channel: channel.clone(),
                sender,
            },
        );
        drop(registry);
        ProgressSubscription {
            id,
            pack_id,
            channel,
            receiver,
        }
    }

    /// Stop delivery for a subscription and release its registration.
    ///
    /// Returns `true` when a live registration was removed; releasing an
    /// unknown or already released id is a no-op returning `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }

    /// Deliver `event` to every live subscriber of its pack's channel.
    ///
    /// Returns the number of subscriptions that accepted the event.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let channel = progress_channel_name(event.pack_id);
        let mut delivered = 0;
        self.lock().subscribers.retain(|_, subscriber| {
            if subscriber.channel != channel {
                return true;
            }
            // A dropped receiver means the handle went away without unsubscribing.
            let alive = subscriber.sender.send(event).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }

    /// Number of live subscriptions on the channel for `pack_id`.
    #[must_use]
    pub fn subscriber_count(&self, pack_id: PackId) -> usize {
        let channel = progress_channel_name(pack_id);
        self.lock()
            .subscribers
            .values()
            .filter(|subscriber| subscriber.channel == channel)
            .count()
    }

    /// Publishing handle bound to a single pack id.
    #[must_use]
    pub fn publisher(&self, pack_id: PackId) -> ProgressPublisher {
        ProgressPublisher {
            channel: self.clone(),
            pack_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving side of one progress subscription.
#[derive(Debug)]
pub struct ProgressSubscription {
    id: SubscriptionId,
    pack_id: PackId,
    channel: String,
    receiver: UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscription {
    /// Registration id, used to unsubscribe.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Pack this subscription listens to.
    #[must_use]
    pub const fn pack_id(&self) -> PackId {
        self.pack_id
    }

    /// Channel name this subscription is attached to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next event. Returns `None` once the subscription has been
    /// released and all buffered events were drained.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive of a buffered event.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Emitting side handed to the pack worker.
#[derive(Clone)]
pub struct ProgressPublisher {
    channel: ProgressChannel,
    pack_id: PackId,
}

impl ProgressPublisher {
    /// Pack the publisher emits for.
    #[must_use]
    pub const fn pack_id(&self) -> PackId {
        self.pack_id
    }

    /// Emit one progress update; returns the number of receivers reached.
    pub fn emit(&self, stage: DownloadStage, bytes_downloaded: u64, bytes_total: u64) -> usize {
        self.channel.publish(ProgressEvent::new(
            self.pack_id,
            stage,
            bytes_downloaded,
            bytes_total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_only_matching_channel_in_order() {
        let channel = ProgressChannel::new();
        let mut first = channel.subscribe(42);
        let mut other = channel.subscribe(7);
        assert_eq!(first.channel(), "download-progress-42");

        let publisher = channel.publisher(42);
        assert_eq!(publisher.emit(DownloadStage::Downloading, 10, 100), 1);
        assert_eq!(publisher.emit(DownloadStage::Downloading, 20, 100), 1);
        assert_eq!(publisher.emit(DownloadStage::Extracting, 100, 100), 1);

        let received = [
            first.next().await.expect("first"),
            first.next().await.expect("second"),
            first.next().await.expect("third"),
        ];
        assert_eq!(received[0].bytes_downloaded, 10);
        assert_eq!(received[1].bytes_downloaded, 20);
        assert_eq!(received[2].stage, DownloadStage::Extracting);
        assert!(other.try_next().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let channel = ProgressChannel::new();
        let mut subscription = channel.subscribe(1);
        let id = subscription.id();

        assert!(channel.unsubscribe(id));
        assert!(!channel.unsubscribe(id));
        assert!(!channel.unsubscribe(9_999));

        assert_eq!(channel.publisher(1).emit(DownloadStage::Downloading, 1, 2), 0);
        assert!(subscription.next().await.is_none());
        assert_eq!(channel.subscriber_count(1), 0);
    }

    #[test]
    fn events_without_subscribers_are_dropped() {
        let channel = ProgressChannel::new();
        assert_eq!(
            channel.publish(ProgressEvent::new(5, DownloadStage::Converting, 1, 1)),
            0
        );
        let mut late = channel.subscribe(5);
        assert!(late.try_next().is_none());
    }

    #[test]
    fn dropped_handles_are_pruned_on_publish() {
        let channel = ProgressChannel::new();
        let subscription = channel.subscribe(3);
        drop(subscription);
        assert_eq!(channel.subscriber_count(3), 1);
        assert_eq!(channel.publisher(3).emit(DownloadStage::Downloading, 0, 0), 0);
        assert_eq!(channel.subscriber_count(3), 0);
    }
}
