pub mod bookings;
pub mod common;
pub mod health;
pub mod payments;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::gateway::PaymentGateway;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub bookings: Arc<crate::services::bookings::BookingService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        app_origin: String,
    ) -> Self {
        let bookings = Arc::new(crate::services::bookings::BookingService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let payments = Arc::new(crate::services::payments::PaymentService::new(
            db,
            gateway,
            event_sender,
            app_origin,
        ));
        Self { bookings, payments }
    }
}
