use crate::{
    entities::booking::{
        self, ActiveModel as BookingActiveModel, Entity as BookingEntity, Model as BookingModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BookingKind, BookingStatus, PaymentStatus},
    services::bookings::{parse_booking_status, parse_payment_status, BookingResponse},
    services::gateway::{CreateSessionRequest, PaymentGateway, SessionState},
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Attempts to persist a freshly issued tracker before giving up and
/// reporting the session as unusable.
const TRACKER_WRITE_ATTEMPTS: usize = 2;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "return_url": "https://app.vakeel.pk/payment/return",
    "cancel_url": "https://app.vakeel.pk/payment/cancel"
}))]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 1, message = "Return URL is required"))]
    pub return_url: String,
    #[validate(length(min = 1, message = "Cancel URL is required"))]
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub checkout_url: String,
    pub tracker_token: String,
    /// Booking id, doubling as the gateway order reference.
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, message = "Tracker token is required"))]
    pub tracker_token: String,
}

/// Bridges the booking lifecycle and the hosted payment gateway:
/// creates checkout sessions, stores tracker tokens, verifies
/// completions.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    /// Redirect URLs handed to the gateway must live under this origin.
    app_origin: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        app_origin: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            app_origin,
        }
    }

    /// Opens a hosted checkout session for a pending booking.
    ///
    /// The charge amount comes from the fee snapshot taken at booking
    /// creation. The tracker is persisted before the checkout URL is
    /// released to the caller, so a session the client can open is
    /// always one the server can later verify.
    #[instrument(skip(self, request), fields(booking_id = %booking_id, kind = %kind))]
    pub async fn initiate(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.check_redirect_origin(&request.return_url)?;
        self.check_redirect_origin(&request.cancel_url)?;

        let booking = self.find_scoped(kind, booking_id).await?;

        if parse_payment_status(&booking.payment_status)? == PaymentStatus::Paid {
            return Err(ServiceError::AlreadyPaid(format!(
                "booking {} is already paid",
                booking.reference_number
            )));
        }

        let amount_minor = to_minor_units(booking.fee_amount).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "fee {} cannot be expressed in minor units",
                booking.fee_amount
            ))
        })?;

        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                order_id: booking.id,
                amount_minor,
                currency: booking.currency.clone(),
                return_url: request.return_url,
                cancel_url: request.cancel_url,
            })
            .await?;

        // A failed write here would leave a live session the server
        // cannot verify, so the tracker goes down before the URL goes
        // out, and the write gets a second chance.
        self.persist_tracker(kind, booking_id, &session.tracker_token)
            .await?;

        info!(booking_id = %booking_id, tracker = %session.tracker_token, "checkout session created");

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentInitiated {
                booking_id,
                tracker_token: session.tracker_token.clone(),
            })
            .await
        {
            warn!(error = %e, booking_id = %booking_id, "failed to send payment initiated event");
        }

        Ok(InitiatePaymentResponse {
            checkout_url: session.checkout_url,
            tracker_token: session.tracker_token,
            order_id: booking_id,
        })
    }

    /// Verifies a completed checkout and flips the booking to paid.
    ///
    /// Idempotent: a booking that is already paid returns its current
    /// state unchanged, with no second `PaymentConfirmed` event. The
    /// supplied tracker must match the stored one AND verify against
    /// the gateway; a client-side success message is never trusted on
    /// its own.
    #[instrument(skip(self, request), fields(booking_id = %booking_id, kind = %kind))]
    pub async fn confirm(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        request: ConfirmPaymentRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let booking = self.find_scoped(kind, booking_id).await?;

        if parse_payment_status(&booking.payment_status)? == PaymentStatus::Paid {
            info!(booking_id = %booking_id, "confirm called on a settled booking; returning current state");
            return BookingResponse::from_model(booking);
        }

        let stored = booking.tracker_token.clone().ok_or_else(|| {
            ServiceError::BadRequest("no payment session exists for this booking".to_string())
        })?;
        if stored != request.tracker_token {
            warn!(booking_id = %booking_id, "confirm called with a tracker that does not match the stored session");
            return Err(ServiceError::ValidationError(
                "tracker token does not match the payment session".to_string(),
            ));
        }

        let verified = self.gateway.verify_session(&stored).await?;

        match verified.state {
            SessionState::Completed => {}
            SessionState::Pending => {
                return Err(ServiceError::PaymentFailed(
                    "payment has not completed yet".to_string(),
                ));
            }
            SessionState::Failed => {
                self.record_failed_attempt(booking_id).await;
                return Err(ServiceError::PaymentFailed(
                    "payment was declined by the gateway".to_string(),
                ));
            }
        }

        let expected_minor = to_minor_units(booking.fee_amount).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "fee {} cannot be expressed in minor units",
                booking.fee_amount
            ))
        })?;
        if verified.amount_minor != expected_minor
            || !verified.currency.eq_ignore_ascii_case(&booking.currency)
        {
            error!(
                booking_id = %booking_id,
                expected = expected_minor,
                settled = verified.amount_minor,
                "settled amount does not match the booking fee"
            );
            return Err(ServiceError::PaymentFailed(
                "settled amount does not match the booking fee".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        // Re-read inside the transaction: a concurrent confirm may have
        // settled the booking between the check above and here.
        let model = BookingEntity::find_by_id(booking_id)
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        if parse_payment_status(&model.payment_status)? == PaymentStatus::Paid {
            txn.commit().await?;
            return BookingResponse::from_model(model);
        }

        let current = parse_booking_status(&model.booking_status)?;
        let reference = model.reference_number.clone();
        let version = model.version;

        let mut active: BookingActiveModel = model.into();
        active.payment_status = Set(PaymentStatus::Paid.to_string());
        // A booking already activated by staff assignment keeps its
        // active status; only the not-yet-started case advances.
        if current == BookingStatus::PendingPayment {
            active.booking_status = Set(BookingStatus::PaymentConfirmed.to_string());
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(booking_id = %booking_id, reference, "payment confirmed");

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentConfirmed {
                booking_id,
                reference_number: reference,
            })
            .await
        {
            warn!(error = %e, booking_id = %booking_id, "failed to send payment confirmed event");
        }

        BookingResponse::from_model(updated)
    }

    async fn find_scoped(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
    ) -> Result<BookingModel, ServiceError> {
        let db = &*self.db;
        BookingEntity::find_by_id(booking_id)
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))
    }

    async fn persist_tracker(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        tracker: &str,
    ) -> Result<(), ServiceError> {
        let db = &*self.db;
        let mut last_err: Option<ServiceError> = None;

        for attempt in 1..=TRACKER_WRITE_ATTEMPTS {
            match self.find_scoped(kind, booking_id).await {
                Ok(model) => {
                    let version = model.version;
                    let mut active: BookingActiveModel = model.into();
                    active.tracker_token = Set(Some(tracker.to_string()));
                    active.updated_at = Set(Some(Utc::now()));
                    active.version = Set(version + 1);
                    match active.update(db).await {
                        Ok(_) => return Ok(()),
                        Err(e) => {
                            warn!(error = %e, attempt, booking_id = %booking_id, "tracker write failed");
                            last_err = Some(ServiceError::DatabaseError(e));
                        }
                    }
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        // The session is live at the gateway but unreferenced here.
        // Logged with the tracker so support can reconcile it manually.
        error!(booking_id = %booking_id, tracker, "could not persist tracker; checkout session orphaned");
        Err(last_err.unwrap_or_else(|| {
            ServiceError::InternalError("tracker persistence failed".to_string())
        }))
    }

    /// Best-effort record of a declined attempt. The booking stays
    /// payable: a later session can still move it pending→paid.
    async fn record_failed_attempt(&self, booking_id: Uuid) {
        let db = &*self.db;
        let model = match BookingEntity::find_by_id(booking_id).one(db).await {
            Ok(Some(model)) => model,
            _ => return,
        };
        if let Ok(PaymentStatus::Paid) = parse_payment_status(&model.payment_status) {
            return;
        }
        let version = model.version;
        let mut active: BookingActiveModel = model.into();
        active.payment_status = Set(PaymentStatus::Failed.to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        if let Err(e) = active.update(db).await {
            warn!(error = %e, booking_id = %booking_id, "failed to record declined payment attempt");
        }
    }

    /// A prefix comparison is not enough here: it would accept a host
    /// like `app.vakeel.pk.evil.com`. Both URLs are parsed and their
    /// origins compared.
    fn check_redirect_origin(&self, url: &str) -> Result<(), ServiceError> {
        let expected = Url::parse(&self.app_origin).map_err(|e| {
            ServiceError::InternalError(format!("configured app origin is invalid: {}", e))
        })?;
        let parsed = Url::parse(url).map_err(|_| {
            ServiceError::ValidationError("redirect URL is not a valid URL".to_string())
        })?;

        if parsed.origin() == expected.origin() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(format!(
                "redirect URL must live under {}",
                self.app_origin
            )))
        }
    }
}

/// Converts a major-unit fee into gateway minor units (paisa for PKR).
fn to_minor_units(amount: Decimal) -> Option<i64> {
    let minor = amount.checked_mul(Decimal::from(100))?;
    if minor.fract() != Decimal::ZERO {
        return None;
    }
    minor.to_i64()
}
