use super::TickSink;
use crate::error::SinkError;
use crate::event::TickEvent;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Fan-out to any number of async subscribers.
///
/// Sending never waits: a subscriber that falls more than `capacity` events
/// behind sees `RecvError::Lagged` and skips ahead.
#[derive(Debug)]
pub struct BroadcastSink {
    sender: Mutex<Option<broadcast::Sender<TickEvent>>>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender: Mutex::new(Some(sender)) }
    }

    /// New receiver, or `None` once the sink is closed
    pub fn subscribe(&self) -> Option<broadcast::Receiver<TickEvent>> {
        self.sender.lock().as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, broadcast::Sender::receiver_count)
    }
}

impl TickSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn consume(&self, event: &TickEvent) -> Result<(), SinkError> {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                // No receivers is not an error
                let _ = sender.send(event.clone());
                Ok(())
            }
            None => Err(SinkError::Closed { sink: self.name().to_string() }),
        }
    }

    /// Dropping the sender ends every subscriber's stream
    fn close(&self) {
        self.sender.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let sink = BroadcastSink::new(8);
        let mut first = sink.subscribe().unwrap();
        let mut second = sink.subscribe().unwrap();
        assert_eq!(sink.receiver_count(), 2);

        for seq in 1..=3 {
            sink.consume(&TickEvent::new("A", seq, 60, Local::now())).unwrap();
        }

        for rx in [&mut first, &mut second] {
            for seq in 1..=3 {
                assert_eq!(rx.recv().await.unwrap().sequence, seq);
            }
        }
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let sink = BroadcastSink::new(4);
        let mut rx = sink.subscribe().unwrap();

        sink.close();
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert!(sink.subscribe().is_none());
        assert!(sink.consume(&TickEvent::new("A", 1, 60, Local::now())).is_err());
    }

    #[test]
    fn test_send_without_receivers_is_ok() {
        let sink = BroadcastSink::new(4);
        assert!(sink.consume(&TickEvent::new("A", 1, 60, Local::now())).is_ok());
    }

    #[test]
    fn test_lagging_subscriber_does_not_block_sender() {
        let sink = BroadcastSink::new(2);
        let mut rx = sink.subscribe().unwrap();

        for seq in 1..=5 {
            sink.consume(&TickEvent::new("A", seq, 60, Local::now())).unwrap();
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(3))));
        assert_eq!(rx.try_recv().unwrap().sequence, 4);
    }
}
