use crate::{
    entities::booking::{
        self, ActiveModel as BookingActiveModel, Entity as BookingEntity, Model as BookingModel,
    },
    entities::offering::{self, Entity as OfferingEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{validate_intake, BookingKind, BookingStatus, PaymentStatus},
};
use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// How many random reference numbers to try before giving up. The
/// suffix space is 16^6 per kind per year, so collisions are rare and
/// a second draw almost always clears one.
const REFERENCE_ATTEMPTS: usize = 4;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "offering": "company-registration",
    "customer_name": "Ayesha Raza",
    "customer_email": "ayesha@example.com",
    "customer_phone": "+92 300 1234567",
    "details": {
        "business_name": "Raza Textiles",
        "business_structure": "private_limited",
        "city": "Karachi"
    }
}))]
pub struct CreateBookingRequest {
    /// Slug of the catalog offering being purchased
    #[validate(length(min = 1, max = 100, message = "Offering is required"))]
    pub offering: String,

    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub customer_name: String,

    #[validate(email(message = "A valid email address is required"))]
    pub customer_email: String,

    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub customer_phone: Option<String>,

    /// Kind-specific intake fields, validated against the booking kind
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AssignStaffRequest {
    pub staff_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBookingStatusRequest {
    /// Target status (snake_case, e.g. "completed")
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub reference_number: String,
    pub kind: BookingKind,
    pub offering_id: Uuid,
    pub fee_amount: Decimal,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub details: serde_json::Value,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
    pub tracker_token: Option<String>,
    pub assigned_staff_id: Option<Uuid>,
    /// True when the consultation may enter the scheduling step:
    /// payment confirmed, slot not yet booked.
    pub scheduling_unlocked: bool,
    pub scheduling_completed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl BookingResponse {
    pub fn from_model(model: BookingModel) -> Result<Self, ServiceError> {
        let kind = parse_kind(&model.kind)?;
        let payment_status = parse_payment_status(&model.payment_status)?;
        let booking_status = parse_booking_status(&model.booking_status)?;
        let scheduling_unlocked = kind == BookingKind::Consultation
            && payment_status == PaymentStatus::Paid
            && !model.scheduling_completed;

        Ok(Self {
            id: model.id,
            reference_number: model.reference_number,
            kind,
            offering_id: model.offering_id,
            fee_amount: model.fee_amount,
            currency: model.currency,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            details: model.details,
            payment_status,
            booking_status,
            tracker_token: model.tracker_token,
            assigned_staff_id: model.assigned_staff_id,
            scheduling_unlocked,
            scheduling_completed: model.scheduling_completed,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
        })
    }
}

/// Guest-safe status view. Deliberately minimal: no staff, no tracker,
/// no intake detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicStatusResponse {
    pub reference_number: String,
    pub kind: BookingKind,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service owning booking creation and the guarded status transitions.
#[derive(Clone)]
pub struct BookingService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl BookingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a booking from a guest intake submission.
    ///
    /// The fee and currency are snapshotted from the offering at this
    /// point; later payment steps never consult the catalog again and
    /// never trust client-supplied amounts.
    #[instrument(skip(self, request), fields(kind = %kind, offering = %request.offering))]
    pub async fn create(
        &self,
        kind: BookingKind,
        request: CreateBookingRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let details =
            validate_intake(kind, &request.details).map_err(ServiceError::FieldValidation)?;
        let details_json = serde_json::to_value(&details)
            .map_err(|e| ServiceError::InternalError(format!("intake serialization: {}", e)))?;

        let db = &*self.db;
        let offering = OfferingEntity::find()
            .filter(offering::Column::Slug.eq(request.offering.trim()))
            .filter(offering::Column::Kind.eq(kind.to_string()))
            .one(db)
            .await?;

        let offering = match offering {
            Some(model) if model.is_active => model,
            _ => {
                return Err(ServiceError::NotFound(format!(
                    "Offering '{}' not found",
                    request.offering
                )))
            }
        };

        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let email = request.customer_email.trim().to_ascii_lowercase();

        let mut last_err: Option<ServiceError> = None;
        for _ in 0..REFERENCE_ATTEMPTS {
            let reference = generate_reference(kind, now);

            let existing = BookingEntity::find()
                .filter(booking::Column::ReferenceNumber.eq(reference.clone()))
                .one(db)
                .await?;
            if existing.is_some() {
                warn!(reference, "reference number collision, retrying");
                continue;
            }

            let active = BookingActiveModel {
                id: Set(booking_id),
                reference_number: Set(reference.clone()),
                kind: Set(kind.to_string()),
                offering_id: Set(offering.id),
                fee_amount: Set(offering.fee),
                currency: Set(offering.currency.clone()),
                customer_name: Set(request.customer_name.trim().to_string()),
                customer_email: Set(email.clone()),
                customer_phone: Set(request.customer_phone.clone()),
                details: Set(details_json.clone()),
                payment_status: Set(PaymentStatus::Pending.to_string()),
                booking_status: Set(BookingStatus::PendingPayment.to_string()),
                tracker_token: Set(None),
                assigned_staff_id: Set(None),
                scheduling_completed: Set(false),
                notes: Set(None),
                created_at: Set(now),
                updated_at: Set(Some(now)),
                version: Set(1),
            };

            match active.insert(db).await {
                Ok(model) => {
                    info!(booking_id = %booking_id, reference, "booking created");
                    if let Err(e) = self
                        .event_sender
                        .send(Event::BookingCreated {
                            booking_id,
                            reference_number: reference,
                        })
                        .await
                    {
                        warn!(error = %e, booking_id = %booking_id, "failed to send booking created event");
                    }
                    return BookingResponse::from_model(model);
                }
                // Unique-index race with a concurrent insert: draw again.
                Err(e) => {
                    warn!(error = %e, reference, "booking insert failed, retrying with a new reference");
                    last_err = Some(ServiceError::DatabaseError(e));
                }
            }
        }

        error!(booking_id = %booking_id, "exhausted reference number attempts");
        Err(last_err
            .unwrap_or_else(|| ServiceError::InternalError("reference allocation failed".into())))
    }

    /// Fetches a booking by id, scoped to the route's kind.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn get(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        let model = self.find_scoped(kind, booking_id).await?;
        BookingResponse::from_model(model)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        kind: BookingKind,
        page: u64,
        per_page: u64,
    ) -> Result<BookingListResponse, ServiceError> {
        let db = &*self.db;
        let paginator = BookingEntity::find()
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .order_by_desc(booking::Column::CreatedAt)
            .paginate(db, per_page.max(1));

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;

        let bookings = models
            .into_iter()
            .map(BookingResponse::from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BookingListResponse {
            bookings,
            total,
            page,
            per_page,
        })
    }

    /// Guest-safe status lookup gated on an exact two-factor match.
    ///
    /// A wrong reference and a wrong email both produce the same
    /// `NotFound` so the endpoint cannot be used to enumerate either
    /// reference numbers or customer emails.
    #[instrument(skip(self, email))]
    pub async fn get_public_status(
        &self,
        kind: BookingKind,
        reference: &str,
        email: &str,
    ) -> Result<PublicStatusResponse, ServiceError> {
        let db = &*self.db;
        let model = BookingEntity::find()
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .filter(booking::Column::ReferenceNumber.eq(reference.trim()))
            .filter(booking::Column::CustomerEmail.eq(email.trim().to_ascii_lowercase()))
            .one(db)
            .await?;

        let model = model.ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        Ok(PublicStatusResponse {
            kind: parse_kind(&model.kind)?,
            booking_status: parse_booking_status(&model.booking_status)?,
            payment_status: parse_payment_status(&model.payment_status)?,
            reference_number: model.reference_number,
            created_at: model.created_at,
        })
    }

    /// Assigns a staff member and, when the booking is still awaiting
    /// activation, promotes it to the kind's active state.
    ///
    /// NOTE: this promotion happens regardless of payment status. It is
    /// a deliberate business rule: assignment means a lawyer has agreed
    /// to start work, and the firm accepts the collection risk. This is
    /// the single sanctioned exception to the "paid before advancing"
    /// invariant enforced everywhere else.
    #[instrument(skip(self), fields(booking_id = %booking_id, staff_id = %staff_id))]
    pub async fn assign(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        staff_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await?;

        let model = BookingEntity::find_by_id(booking_id)
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        let current = parse_booking_status(&model.booking_status)?;
        if current.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot assign staff to a {} booking",
                current
            )));
        }

        let promoted = current.awaiting_activation().then(|| kind.active_status());
        let old_status = current.to_string();
        let version = model.version;

        let mut active: BookingActiveModel = model.into();
        active.assigned_staff_id = Set(Some(staff_id));
        if let Some(next) = promoted {
            active.booking_status = Set(next.to_string());
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(booking_id = %booking_id, staff_id = %staff_id, promoted = promoted.is_some(), "staff assigned");

        if let Err(e) = self
            .event_sender
            .send(Event::BookingAssigned {
                booking_id,
                staff_id,
            })
            .await
        {
            warn!(error = %e, booking_id = %booking_id, "failed to send booking assigned event");
        }
        if let Some(next) = promoted {
            if let Err(e) = self
                .event_sender
                .send(Event::BookingStatusChanged {
                    booking_id,
                    old_status,
                    new_status: next.to_string(),
                })
                .await
            {
                warn!(error = %e, booking_id = %booking_id, "failed to send status changed event");
            }
        }

        BookingResponse::from_model(updated)
    }

    /// Staff-driven status update, checked against the transition table.
    #[instrument(skip(self, request), fields(booking_id = %booking_id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        request: UpdateBookingStatusRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let next = BookingStatus::from_str(request.status.trim()).map_err(|_| {
            ServiceError::InvalidStatus(format!("unknown status '{}'", request.status))
        })?;

        let db = &*self.db;
        let txn = db.begin().await?;

        let model = BookingEntity::find_by_id(booking_id)
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        let current = parse_booking_status(&model.booking_status)?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot move a {} booking to {}",
                current, next
            )));
        }

        let old_status = current.to_string();
        let version = model.version;
        let mut active: BookingActiveModel = model.into();
        active.booking_status = Set(next.to_string());
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(booking_id = %booking_id, old_status, new_status = %next, "booking status updated");

        if let Err(e) = self
            .event_sender
            .send(Event::BookingStatusChanged {
                booking_id,
                old_status,
                new_status: next.to_string(),
            })
            .await
        {
            warn!(error = %e, booking_id = %booking_id, "failed to send status changed event");
        }

        BookingResponse::from_model(updated)
    }

    /// Records that the external calendar widget booked a slot for a
    /// paid consultation. Payment is the gate; an unpaid booking cannot
    /// reach scheduling.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn mark_scheduled(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        if kind != BookingKind::Consultation {
            return Err(ServiceError::BadRequest(
                "scheduling applies only to consultations".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let model = BookingEntity::find_by_id(booking_id)
            .filter(booking::Column::Kind.eq(kind.to_string()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        if parse_payment_status(&model.payment_status)? != PaymentStatus::Paid {
            return Err(ServiceError::Conflict(
                "payment must be confirmed before scheduling".to_string(),
            ));
        }

        let current = parse_booking_status(&model.booking_status)?;
        let old_status = current.to_string();
        let moves_to_booked = current == BookingStatus::PaymentConfirmed;
        let version = model.version;

        let mut active: BookingActiveModel = model.into();
        active.scheduling_completed = Set(true);
        if moves_to_booked {
            active.booking_status = Set(BookingStatus::Booked.to_string());
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        if moves_to_booked {
            if let Err(e) = self
                .event_sender
                .send(Event::BookingStatusChanged {
                    booking_id,
                    old_status,
                    new_status: BookingStatus::Booked.to_string(),
                })
                .await
            {
                warn!(error = %e, booking_id = %booking_id, "failed to send status changed event");
            }
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
}

pub(crate) fn parse_kind(value: &str) -> Result<BookingKind, ServiceError> {
    BookingKind::from_str(value)
        .map_err(|_| ServiceError::InternalError(format!("corrupt booking kind '{}'", value)))
}

pub(crate) fn parse_payment_status(value: &str) -> Result<PaymentStatus, ServiceError> {
    PaymentStatus::from_str(value)
        .map_err(|_| ServiceError::InternalError(format!("corrupt payment status '{}'", value)))
}

pub(crate) fn parse_booking_status(value: &str) -> Result<BookingStatus, ServiceError> {
    BookingStatus::from_str(value)
        .map_err(|_| ServiceError::InternalError(format!("corrupt booking status '{}'", value)))
}

fn generate_reference(kind: BookingKind, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{}-{:06X}", kind.reference_prefix(), now.year(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_format_matches_kind_and_year() {
        let now = Utc::now();
        let reference = generate_reference(BookingKind::Registration, now);
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "REG");
        assert_eq!(parts[1], now.year().to_string());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scheduling_unlocked_requires_paid_consultation() {
        let now = Utc::now();
        let model = BookingModel {
            id: Uuid::new_v4(),
            reference_number: "CON-2026-0A1B2C".to_string(),
            kind: "consultation".to_string(),
            offering_id: Uuid::new_v4(),
            fee_amount: Decimal::new(50_000, 0),
            currency: "PKR".to_string(),
            customer_name: "Bilal Khan".to_string(),
            customer_email: "bilal@example.com".to_string(),
            customer_phone: None,
            details: serde_json::json!({
                "topic": "tax",
                "brief": "Advice on overdue returns",
                "preferred_language": "urdu"
            }),
            payment_status: "paid".to_string(),
            booking_status: "payment_confirmed".to_string(),
            tracker_token: Some("track_1".to_string()),
            assigned_staff_id: None,
            scheduling_completed: false,
            notes: None,
            created_at: now,
            updated_at: Some(now),
            version: 2,
        };

        let response = BookingResponse::from_model(model.clone()).unwrap();
        assert!(response.scheduling_unlocked);

        let mut unpaid = model;
        unpaid.payment_status = "pending".to_string();
        unpaid.booking_status = "pending_payment".to_string();
        let response = BookingResponse::from_model(unpaid).unwrap();
        assert!(!response.scheduling_unlocked);
    }
}
