use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// The two booking products. Routes are scoped per kind; the kind also
/// decides the reference-number prefix and the post-payment "active"
/// state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Registration,
    Consultation,
}

impl BookingKind {
    pub fn reference_prefix(self) -> &'static str {
        match self {
            BookingKind::Registration => "REG",
            BookingKind::Consultation => "CON",
        }
    }

    /// URL path segment the kind's routes are nested under.
    pub fn route_segment(self) -> &'static str {
        match self {
            BookingKind::Registration => "registrations",
            BookingKind::Consultation => "consultations",
        }
    }

    /// The state a booking of this kind enters once work begins.
    pub fn active_status(self) -> BookingStatus {
        match self {
            BookingKind::Registration => BookingStatus::InProgress,
            BookingKind::Consultation => BookingStatus::Booked,
        }
    }
}

/// Monotonic payment state. `Failed` marks a failed checkout attempt;
/// the booking itself stays payable and a later session may still
/// complete.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    PaymentConfirmed,
    InProgress,
    Booked,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// States from which staff assignment auto-promotes the booking to
    /// the kind's active state.
    pub fn awaiting_activation(self) -> bool {
        matches!(
            self,
            BookingStatus::PendingPayment | BookingStatus::PaymentConfirmed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// Allowed staff-driven transitions. Payment-driven states
    /// (`PendingPayment`, `PaymentConfirmed`) are only ever entered by
    /// the payment flow, so no transition leads INTO them here.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        if self == next {
            return false;
        }
        match self {
            PendingPayment => matches!(next, InProgress | Booked | Cancelled),
            PaymentConfirmed => matches!(next, InProgress | Booked | Completed | Cancelled | NoShow),
            InProgress => matches!(next, Completed | Cancelled),
            Booked => matches!(next, Completed | Cancelled | NoShow),
            Completed | Cancelled | NoShow => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_strings() {
        assert_eq!(BookingStatus::PendingPayment.to_string(), "pending_payment");
        assert_eq!(
            BookingStatus::from_str("payment_confirmed").unwrap(),
            BookingStatus::PaymentConfirmed
        );
        assert_eq!(PaymentStatus::Paid.to_string(), "paid");
        assert_eq!(BookingKind::from_str("consultation").unwrap(), BookingKind::Consultation);
    }

    #[rstest]
    #[case(BookingStatus::PendingPayment, BookingStatus::InProgress, true)]
    #[case(BookingStatus::PendingPayment, BookingStatus::Cancelled, true)]
    #[case(BookingStatus::PendingPayment, BookingStatus::Completed, false)]
    #[case(BookingStatus::PaymentConfirmed, BookingStatus::Booked, true)]
    #[case(BookingStatus::InProgress, BookingStatus::Completed, true)]
    #[case(BookingStatus::InProgress, BookingStatus::NoShow, false)]
    #[case(BookingStatus::Booked, BookingStatus::NoShow, true)]
    #[case(BookingStatus::Completed, BookingStatus::InProgress, false)]
    #[case(BookingStatus::Cancelled, BookingStatus::PendingPayment, false)]
    #[case(BookingStatus::NoShow, BookingStatus::Completed, false)]
    fn staff_transitions(
        #[case] from: BookingStatus,
        #[case] to: BookingStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn nothing_transitions_into_payment_states() {
        use strum::IntoEnumIterator;
        for from in BookingStatus::iter() {
            assert!(!from.can_transition_to(BookingStatus::PendingPayment));
            assert!(!from.can_transition_to(BookingStatus::PaymentConfirmed));
        }
    }

    #[test]
    fn active_status_per_kind() {
        assert_eq!(
            BookingKind::Registration.active_status(),
            BookingStatus::InProgress
        );
        assert_eq!(
            BookingKind::Consultation.active_status(),
            BookingStatus::Booked
        );
    }
}
