use chrono::{DateTime, Utc};
use myfin_core::error::MyfinError;
use myfin_core::types::{Amount, PaymentReference, TaskId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Discrete inputs to a session. Each runs to completion before the next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Mine,
    TriggerTask(TaskId),
    PageHidden,
    PageVisible,
    ClaimFreeGrant,
    BuyPlan(String),
    PaymentSucceeded { reference: PaymentReference },
    PaymentClosed { reference: PaymentReference },
    RequestWithdrawal(Amount),
    /// Periodic timer; re-evaluates day rollover.
    Tick,
    /// Handle whatever is already queued, then stop the loop.
    Shutdown,
}

/// An event plus the instant it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub at: DateTime<Utc>,
    pub event: Event,
}

/// Producer side of the session queue.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Envelope>,
}

impl EventSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), MyfinError> {
        self.send_at(event, Utc::now()).await
    }

    pub async fn send_at(&self, event: Event, at: DateTime<Utc>) -> Result<(), MyfinError> {
        self.tx
            .send(Envelope { at, event })
            .await
            .map_err(|_| MyfinError::QueueClosed)
    }

    /// Non-blocking enqueue for synchronous callbacks such as a payment
    /// provider answering from inside a handler. A full queue refuses the
    /// event with `QueueFull` instead of waiting on the consumer, which may
    /// be the caller.
    pub fn post_at(&self, event: Event, at: DateTime<Utc>) -> Result<(), MyfinError> {
        self.tx.try_send(Envelope { at, event }).map_err(|e| match e {
            TrySendError::Full(_) => MyfinError::QueueFull,
            TrySendError::Closed(_) => MyfinError::QueueClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_reports_full_and_closed_separately() {
        let (sender, rx) = EventSender::channel(1);
        let now = Utc::now();
        sender.post_at(Event::Tick, now).unwrap();
        assert!(matches!(sender.post_at(Event::Tick, now), Err(MyfinError::QueueFull)));

        drop(rx);
        assert!(matches!(sender.post_at(Event::Tick, now), Err(MyfinError::QueueClosed)));
    }
}
