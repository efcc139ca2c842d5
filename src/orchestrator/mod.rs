//! Client-side payment orchestration: the state machine that opens the
//! hosted checkout popup, reconciles its completion signals, and
//! drives the booking through confirmation into the next wizard step.

pub mod driver;
pub mod machine;
pub mod wizard;

pub use driver::{
    CheckoutDriver, CheckoutOutcome, ConfirmationApi, HttpConfirmationApi, Popup, PopupOpener,
    DEFAULT_POLL_INTERVAL,
};
pub use machine::{
    CheckoutMachine, CheckoutState, Command, FailureReason, PopupPayload, Signal, WindowMessage,
};
pub use wizard::{BookingWizard, WizardError, WizardStep};
