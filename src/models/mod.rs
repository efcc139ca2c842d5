pub mod intake;
pub mod status;

pub use intake::{validate_intake, FieldErrors, IntakeDetails};
pub use status::{BookingKind, BookingStatus, PaymentStatus};
