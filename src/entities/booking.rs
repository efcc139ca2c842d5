use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A paid-service request (registration or consultation) tracked
/// through payment and activation.
///
/// `payment_status` is monotonic: once `paid` it never regresses.
/// `tracker_token` always points at the most recently created checkout
/// session; it is a weak reference into the gateway, not ownership.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable unique reference, assigned at creation, immutable.
    #[sea_orm(unique)]
    pub reference_number: String,

    /// "registration" or "consultation"
    pub kind: String,

    pub offering_id: Uuid,

    /// Fee snapshot taken from the offering at creation time; checkout
    /// amounts and verification always use this, never client input.
    pub fee_amount: Decimal,
    pub currency: String,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    /// Kind-specific intake detail, produced by the typed intake union.
    pub details: Json,

    pub payment_status: String,
    pub booking_status: String,

    pub tracker_token: Option<String>,
    pub assigned_staff_id: Option<Uuid>,
    pub scheduling_completed: bool,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::offering::Entity",
        from = "Column::OfferingId",
        to = "super::offering::Column::Id"
    )]
    Offering,
}

impl Related<super::offering::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Offering.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
