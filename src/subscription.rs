use crate::error::{Result, SoundbarError};
use crate::types::{Changeset, DeviceId};
use tokio::sync::broadcast;

/// Event emitted by a [`Soundbar`](crate::Soundbar)
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// `connect()` completed and polling is running
    Connected(DeviceId),

    /// The device closed the connection or the client disconnected
    Disconnected(DeviceId),

    /// One or more attributes changed
    Update {
        device_id: DeviceId,
        changes: Changeset,
    },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::Connected(id) | DeviceEvent::Disconnected(id) => id,
            DeviceEvent::Update { device_id, .. } => device_id,
        }
    }
}

/// Receiver for device events
///
/// A receiver that falls more than the channel capacity behind loses the
/// oldest events. Changesets only carry what changed, so after a loss the
/// receiver keeps delivering but [`EventReceiver::take_missed`] turns non-zero;
/// re-read [`Soundbar::attributes`](crate::Soundbar::attributes) to resync.
///
/// Dropping the receiver (or calling [`EventReceiver::unsubscribe`]) ends the
/// subscription.
pub struct EventReceiver {
    rx: broadcast::Receiver<DeviceEvent>,
    missed: u64,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceEvent>) -> Self {
        Self { rx, missed: 0 }
    }

    /// Receive the next event
    ///
    /// Fails with `ConnectionClosed` once the client has been dropped.
    pub async fn recv(&mut self) -> Result<DeviceEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => self.record_missed(n),
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SoundbarError::ConnectionClosed)
                }
            }
        }
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<DeviceEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.record_missed(n),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SoundbarError::ConnectionClosed)
                }
            }
        }
    }

    /// Number of events dropped since the last call, resetting the count
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {}

    fn record_missed(&mut self, n: u64) {
        tracing::warn!("Event receiver fell behind, {} event(s) dropped", n);
        self.missed += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receives_broadcast_events() {
        let (tx, _) = broadcast::channel(4);
        let mut rx = EventReceiver::new(tx.subscribe());
        assert!(rx.try_recv().unwrap().is_none());

        tx.send(DeviceEvent::Connected("bar".to_string())).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), "bar");
    }

    #[tokio::test]
    async fn closed_sender_ends_stream() {
        let (tx, _) = broadcast::channel::<DeviceEvent>(4);
        let mut rx = EventReceiver::new(tx.subscribe());
        drop(tx);
        assert!(matches!(rx.recv().await, Err(SoundbarError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn lagging_receiver_counts_dropped_events_and_keeps_going() {
        let (tx, _) = broadcast::channel(1);
        let mut rx = EventReceiver::new(tx.subscribe());
        tx.send(DeviceEvent::Connected("a".to_string())).unwrap();
        tx.send(DeviceEvent::Disconnected("a".to_string())).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event, Some(DeviceEvent::Disconnected("a".to_string())));
        assert_eq!(rx.take_missed(), 1);
        assert_eq!(rx.take_missed(), 0);

        tx.send(DeviceEvent::Connected("a".to_string())).unwrap();
        tx.send(DeviceEvent::Connected("b".to_string())).unwrap();
        tx.send(DeviceEvent::Connected("c".to_string())).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), "c");
        assert_eq!(rx.take_missed(), 2);
        assert!(rx.try_recv().unwrap().is_none());
    }
}
