//! Customer notifications triggered by domain events.
//!
//! The event processor is the only caller. `PaymentConfirmed` is
//! emitted once per booking, so the confirmation email goes out at
//! most once even when `confirm` is retried.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound customer notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Booking received; carries the reference the customer quotes later.
    async fn booking_received(
        &self,
        booking_id: Uuid,
        reference_number: &str,
    ) -> Result<(), NotificationError>;

    /// Payment verified; the follow-on step (assignment or scheduling)
    /// is unlocked.
    async fn payment_confirmed(
        &self,
        booking_id: Uuid,
        reference_number: &str,
    ) -> Result<(), NotificationError>;
}

/// Log-only notifier used in development and tests. Production wires
/// the transactional email provider behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_received(
        &self,
        booking_id: Uuid,
        reference_number: &str,
    ) -> Result<(), NotificationError> {
        info!(%booking_id, reference_number, "notification: booking received");
        Ok(())
    }

    async fn payment_confirmed(
        &self,
        booking_id: Uuid,
        reference_number: &str,
    ) -> Result<(), NotificationError> {
        info!(%booking_id, reference_number, "notification: payment confirmed");
        Ok(())
    }
}
