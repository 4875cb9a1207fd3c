//! In-memory change feed for tests/dev.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{ChangeFeed, Subscription};
use crate::change::ChangeEvent;

#[derive(Debug, Error)]
pub enum InMemoryFeedError {
    /// Publish failed due to internal lock poisoning.
    #[error("change feed lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct FeedState {
    next_sequence: u64,
    subscribers: Vec<mpsc::Sender<ChangeEvent>>,
}

/// In-memory broadcast change feed.
///
/// - No IO / no async
/// - Assigns monotonically increasing sequence numbers starting at 1
/// - Best-effort fan-out; dead subscribers are dropped on publish
#[derive(Debug, Default)]
pub struct InMemoryChangeFeed {
    state: Mutex<FeedState>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }
}

impl ChangeFeed for InMemoryChangeFeed {
    type Error = InMemoryFeedError;

    fn publish(&self, event: ChangeEvent) -> Result<u64, Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryFeedError::Poisoned)?;

        state.next_sequence += 1;
        let seq = state.next_sequence;
        let event = event.with_sequence_number(seq);

        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        Ok(seq)
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let feed = InMemoryChangeFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();

        assert_eq!(feed.publish(ChangeEvent::remove()).unwrap(), 1);
        assert_eq!(feed.publish(ChangeEvent::remove()).unwrap(), 2);

        for sub in [&a, &b] {
            let first = sub.recv_timeout(Duration::from_millis(50)).unwrap();
            let second = sub.recv_timeout(Duration::from_millis(50)).unwrap();
            assert_eq!(first.sequence_number(), 1);
            assert_eq!(second.sequence_number(), 2);
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = InMemoryChangeFeed::new();
        let sub = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(sub);
        feed.publish(ChangeEvent::remove()).unwrap();
        assert_eq!(feed.subscriber_count(), 0);
    }
}
