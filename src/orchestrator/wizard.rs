//! Wizard step progression for the booking flow, including the
//! post-payment gate: registrations finish once paid, consultations
//! unlock the scheduling step.

use crate::models::BookingKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Intake,
    Details,
    Payment,
    Scheduling,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("'{action}' is not valid at step {step:?}")]
    OutOfOrder {
        action: &'static str,
        step: WizardStep,
    },
}

/// Owned, explicitly constructed wizard state: created when the flow
/// opens, dropped when it closes. Nothing here is ambient or global.
#[derive(Debug)]
pub struct BookingWizard {
    kind: BookingKind,
    step: WizardStep,
}

impl BookingWizard {
    pub fn new(kind: BookingKind) -> Self {
        Self {
            kind,
            step: WizardStep::Intake,
        }
    }

    pub fn kind(&self) -> BookingKind {
        self.kind
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn is_complete(&self) -> bool {
        self.step == WizardStep::Done
    }

    pub fn submit_intake(&mut self) -> Result<WizardStep, WizardError> {
        self.advance_from(WizardStep::Intake, WizardStep::Details, "submit_intake")
    }

    pub fn submit_details(&mut self) -> Result<WizardStep, WizardError> {
        self.advance_from(WizardStep::Details, WizardStep::Payment, "submit_details")
    }

    /// Called once the checkout orchestrator reports `Confirmed`.
    /// Payment is the gating condition for everything after this
    /// point; scheduling is only reachable here.
    pub fn payment_confirmed(&mut self) -> Result<WizardStep, WizardError> {
        let next = match self.kind {
            BookingKind::Registration => WizardStep::Done,
            BookingKind::Consultation => WizardStep::Scheduling,
        };
        self.advance_from(WizardStep::Payment, next, "payment_confirmed")
    }

    /// The calendar widget reported a booked slot.
    pub fn scheduling_booked(&mut self) -> Result<WizardStep, WizardError> {
        self.advance_from(WizardStep::Scheduling, WizardStep::Done, "scheduling_booked")
    }

    /// Leaves the wizard without completing scheduling. Still a
    /// terminal success for the payment flow; the slot can be booked
    /// later from the status page.
    pub fn finish_later(&mut self) -> Result<WizardStep, WizardError> {
        self.advance_from(WizardStep::Scheduling, WizardStep::Done, "finish_later")
    }

    fn advance_from(
        &mut self,
        expected: WizardStep,
        next: WizardStep,
        action: &'static str,
    ) -> Result<WizardStep, WizardError> {
        if self.step != expected {
            return Err(WizardError::OutOfOrder {
                action,
                step: self.step,
            });
        }
        self.step = next;
        Ok(self.step)
    }
}
