use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notifications::Notifier;

/// Domain events emitted by the booking and payment services.
///
/// `PaymentConfirmed` is the notification trigger (confirmation email,
/// staff ping). The payment service emits it only on an actual
/// pending→paid transition, so downstream side effects run at most once
/// per booking even when `confirm` is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking_id: Uuid,
        reference_number: String,
    },
    PaymentInitiated {
        booking_id: Uuid,
        tracker_token: String,
    },
    PaymentConfirmed {
        booking_id: Uuid,
        reference_number: String,
    },
    BookingAssigned {
        booking_id: Uuid,
        staff_id: Uuid,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel with its sender half wrapped.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Background consumer for domain events.
///
/// Runs until every sender is dropped. Notification delivery is
/// fire-and-forget from the request path's point of view; failures are
/// logged, never surfaced to the caller.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    while let Some(event) = rx.recv().await {
        match event {
            Event::BookingCreated {
                booking_id,
                ref reference_number,
            } => {
                info!(%booking_id, reference_number, "booking created");
                if let Err(e) = notifier
                    .booking_received(booking_id, reference_number)
                    .await
                {
                    warn!(error = %e, %booking_id, "booking-received notification failed");
                }
            }
            Event::PaymentInitiated {
                booking_id,
                ref tracker_token,
            } => {
                info!(%booking_id, tracker = %tracker_token, "checkout session initiated");
            }
            Event::PaymentConfirmed {
                booking_id,
                ref reference_number,
            } => {
                info!(%booking_id, reference_number, "payment confirmed");
                if let Err(e) = notifier
                    .payment_confirmed(booking_id, reference_number)
                    .await
                {
                    warn!(error = %e, %booking_id, "payment-confirmed notification failed");
                }
            }
            Event::BookingAssigned {
                booking_id,
                staff_id,
            } => {
                info!(%booking_id, %staff_id, "booking assigned to staff");
            }
            Event::BookingStatusChanged {
                booking_id,
                ref old_status,
                ref new_status,
            } => {
                info!(%booking_id, old_status, new_status, "booking status changed");
            }
        }
    }
    warn!("event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(8);
        let booking_id = Uuid::new_v4();
        sender
            .send(Event::BookingCreated {
                booking_id,
                reference_number: "REG-2026-A1B2C3".to_string(),
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Event::BookingCreated {
                booking_id: got, ..
            } => assert_eq!(got, booking_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn payment_confirmed_notifies_exactly_once() {
        use crate::notifications::MockNotifier;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_payment_confirmed()
            .times(1)
            .returning(|_, _| Ok(()));
        notifier.expect_booking_received().never();

        let (sender, rx) = channel(8);
        let processor = tokio::spawn(process_events(rx, Arc::new(notifier)));

        sender
            .send(Event::PaymentConfirmed {
                booking_id: Uuid::new_v4(),
                reference_number: "CON-2026-00F00D".to_string(),
            })
            .await
            .unwrap();

        drop(sender);
        processor.await.unwrap();
    }
}
