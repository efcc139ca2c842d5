//! Checkout state machine, kept free of IO.
//!
//! Two independently scheduled callbacks feed this machine while a
//! payment is in flight: the popup message listener and the
//! popup-closed poller. Both run against the same mutable state, so
//! every transition is funneled through [`CheckoutMachine::handle`]
//! and coordinated by a single `settled` flag. The first signal to
//! settle the attempt wins; everything after it is ignored.

use serde::{Deserialize, Serialize};

/// Message posted by the hosted checkout popup back to the opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PopupPayload {
    PaymentSuccess { tracker: String },
    PaymentCancelled,
}

/// A window message together with the origin it arrived from. Only
/// messages from the app's own origin are acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMessage {
    pub origin: String,
    pub payload: PopupPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// `window.open` returned no handle.
    PopupBlocked,
    /// The server rejected the confirmation call.
    ConfirmRejected(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::PopupBlocked => write!(f, "popup blocked"),
            FailureReason::ConfirmRejected(reason) => write!(f, "confirmation failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    AwaitingPayment,
    Confirming,
    Confirmed,
    Cancelled,
    Failed(FailureReason),
}

impl CheckoutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Confirmed | CheckoutState::Cancelled | CheckoutState::Failed(_)
        )
    }
}

/// Inputs delivered to the machine by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    PopupOpened,
    PopupBlocked,
    Message(WindowMessage),
    /// One tick of the popup-closed poller observing a closed handle.
    PopupClosedTick,
    ConfirmSucceeded,
    ConfirmFailed(String),
    Teardown,
}

/// Effects the driver must carry out in response to a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartPolling,
    StopPolling,
    ClosePopup,
    Confirm { tracker: String },
    AdvanceStep,
}

#[derive(Debug)]
pub struct CheckoutMachine {
    state: CheckoutState,
    expected_origin: String,
    /// Tracker issued by `initiate`; retries reuse it without a new
    /// session.
    tracker: Option<String>,
    /// Set by the first settling signal (success message, cancel
    /// message, or closed-popup tick); checked by all of them.
    settled: bool,
}

impl CheckoutMachine {
    pub fn new(expected_origin: impl Into<String>, tracker: Option<String>) -> Self {
        Self {
            state: CheckoutState::Idle,
            expected_origin: expected_origin.into(),
            tracker,
            settled: false,
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn tracker(&self) -> Option<&str> {
        self.tracker.as_deref()
    }

    /// Applies one signal, returning the commands the driver must run.
    pub fn handle(&mut self, signal: Signal) -> Vec<Command> {
        match signal {
            Signal::Teardown => {
                // Cleanup must succeed from any state; a leaked poll
                // interval or popup handle is a correctness bug.
                return vec![Command::StopPolling, Command::ClosePopup];
            }
            Signal::PopupOpened => {
                if self.state == CheckoutState::Idle {
                    self.state = CheckoutState::AwaitingPayment;
                    return vec![Command::StartPolling];
                }
            }
            Signal::PopupBlocked => {
                if self.state == CheckoutState::Idle {
                    self.state = CheckoutState::Failed(FailureReason::PopupBlocked);
                }
            }
            Signal::Message(message) => return self.handle_message(message),
            Signal::PopupClosedTick => {
                // Only an unsettled wait cancels. A tick that lands
                // after the success message (popup auto-closed right
                // after posting) must not clobber the confirmation.
                if self.state == CheckoutState::AwaitingPayment && !self.settled {
                    self.settled = true;
                    self.state = CheckoutState::Cancelled;
                    return vec![Command::StopPolling];
                }
            }
            Signal::ConfirmSucceeded => {
                if self.state == CheckoutState::Confirming {
                    self.state = CheckoutState::Confirmed;
                    return vec![Command::ClosePopup, Command::AdvanceStep];
                }
            }
            Signal::ConfirmFailed(reason) => {
                if self.state == CheckoutState::Confirming {
                    self.state = CheckoutState::Failed(FailureReason::ConfirmRejected(reason));
                    return vec![Command::ClosePopup];
                }
            }
        }
        Vec::new()
    }

    fn handle_message(&mut self, message: WindowMessage) -> Vec<Command> {
        if message.origin != self.expected_origin {
            return Vec::new();
        }
        if self.state != CheckoutState::AwaitingPayment || self.settled {
            return Vec::new();
        }

        match message.payload {
            PopupPayload::PaymentSuccess { tracker } => {
                self.settled = true;
                self.state = CheckoutState::Confirming;
                // The stored tracker is authoritative; the message's
                // copy is only a fallback for the first attempt.
                let tracker = self.tracker.clone().unwrap_or(tracker);
                vec![Command::StopPolling, Command::Confirm { tracker }]
            }
            PopupPayload::PaymentCancelled => {
                self.settled = true;
                self.state = CheckoutState::Cancelled;
                vec![Command::StopPolling, Command::ClosePopup]
            }
        }
    }

    /// Re-arms the machine after a cancelled or failed attempt so the
    /// user can try again. The tracker from the original `initiate` is
    /// kept; re-opening the popup does not create a new session.
    pub fn retry(&mut self) -> Result<(), RetryError> {
        match self.state {
            CheckoutState::Cancelled | CheckoutState::Failed(FailureReason::ConfirmRejected(_)) => {
                self.state = CheckoutState::Idle;
                self.settled = false;
                Ok(())
            }
            CheckoutState::Failed(FailureReason::PopupBlocked) => {
                // Blocked popups are retryable too: nothing was settled.
                self.state = CheckoutState::Idle;
                self.settled = false;
                Ok(())
            }
            _ => Err(RetryError::NotRetryable(self.state.clone())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("checkout in state {0:?} cannot be retried")]
    NotRetryable(CheckoutState),
}
