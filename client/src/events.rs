//! The `upload-queue-updated` signal (§9 "Event-driven UI coupling").
//!
//! This is advisory only — nothing about queue correctness depends on a listener
//! observing it, so it is a plain `tokio::sync::watch` channel rather than anything
//! that could itself become a source of lost updates or deadlock.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueUpdated {
    pub revision: u64,
}

pub struct QueueEvents {
    tx: watch::Sender<QueueUpdated>,
}

impl QueueEvents {
    pub fn new() -> (Self, watch::Receiver<QueueUpdated>) {
        let (tx, rx) = watch::channel(QueueUpdated { revision: 0 });
        (Self { tx }, rx)
    }

    pub fn notify(&self) {
        self.tx.send_modify(|state| state.revision += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueUpdated> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_bumps_the_revision_observers_see() {
        let (events, mut rx) = QueueEvents::new();
        events.notify();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().revision, 1);
    }
}
