//! Change-feed publish/subscribe abstraction.
//!
//! The feed distributes [`ChangeEvent`]s from the primary store to consumers
//! (the document pipeline worker, tests). It is intentionally lightweight:
//!
//! - **At-most-once** in process: each subscription sees an event once and
//!   nothing is redelivered. Consumers still tolerate duplicates, since a
//!   retried insert re-publishes its record. Redelivery of failed records is
//!   the host's job; `BatchReport::failed_event_ids` names them.
//! - **Broadcast**: every subscription receives every event published after it
//!   subscribed.
//! - **No persistence**: the primary store is the source of truth.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::change::ChangeEvent;

/// A subscription to the change feed.
///
/// Designed for single-threaded consumption: one worker thread owns it.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(receiver: Receiver<ChangeEvent>) -> Self {
        Self { receiver }
    }

    /// Block until the next event is available.
    pub fn recv(&self) -> Result<ChangeEvent, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Block for up to `timeout` waiting for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Collect up to `max` events.
    ///
    /// Waits up to `window` for the first event, then keeps collecting until
    /// `max` is reached or `window` has elapsed since the first event arrived.
    /// Returns `Err(Disconnected)` only when the feed is closed and nothing was
    /// collected.
    pub fn recv_batch(
        &self,
        max: usize,
        window: Duration,
    ) -> Result<Vec<ChangeEvent>, RecvTimeoutError> {
        let first = self.receiver.recv_timeout(window)?;
        let mut events = vec![first];
        let deadline = Instant::now() + window;

        while events.len() < max.max(1) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(ev) => events.push(ev),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(events)
    }
}

/// Change feed of the primary store.
///
/// `publish` may fail (closed feed, lock poisoning). Publication happens only
/// after the store write committed, so a failed publish never loses data; the
/// record is already durable.
pub trait ChangeFeed: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Publish an event; returns the sequence number assigned to it.
    fn publish(&self, event: ChangeEvent) -> Result<u64, Self::Error>;

    fn subscribe(&self) -> Subscription;
}

impl<F> ChangeFeed for Arc<F>
where
    F: ChangeFeed + ?Sized,
{
    type Error = F::Error;

    fn publish(&self, event: ChangeEvent) -> Result<u64, Self::Error> {
        (**self).publish(event)
    }

    fn subscribe(&self) -> Subscription {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn recv_batch_stops_at_max() {
        let (tx, rx) = mpsc::channel();
        for _ in 0..5 {
            tx.send(ChangeEvent::remove()).unwrap();
        }
        let sub = Subscription::new(rx);
        let batch = sub.recv_batch(3, Duration::from_millis(50)).unwrap();
        assert_eq!(batch.len(), 3);
        let rest = sub.recv_batch(10, Duration::from_millis(20)).unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn recv_batch_times_out_when_idle() {
        let (_tx, rx) = mpsc::channel::<ChangeEvent>();
        let sub = Subscription::new(rx);
        let err = sub.recv_batch(10, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, RecvTimeoutError::Timeout);
    }

    #[test]
    fn recv_batch_reports_disconnect() {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        drop(tx);
        let sub = Subscription::new(rx);
        let err = sub.recv_batch(10, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, RecvTimeoutError::Disconnected);
    }
}
