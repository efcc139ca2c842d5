//! Async driver for the checkout machine.
//!
//! Owns the popup handle and the poll interval, feeds window messages
//! and poller ticks into the machine, and executes the commands it
//! emits. The driver is the only place the two signal sources exist as
//! real concurrency; everything they may do to shared state is decided
//! by the machine.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use super::machine::{CheckoutMachine, CheckoutState, Command, FailureReason, Signal, WindowMessage};
use super::wizard::BookingWizard;
use crate::models::BookingKind;
use crate::services::bookings::BookingResponse;

/// Default cadence of the popup-closed poller.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A handle to the opened checkout window.
pub trait Popup: Send {
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}

/// Opens the centered checkout window. Returns `None` when the
/// environment blocked the popup.
pub trait PopupOpener: Send + Sync {
    type Handle: Popup;

    fn open(&self, url: &str) -> Option<Self::Handle>;
}

/// The server's confirm-payment endpoint, abstracted so the driver can
/// be exercised without a network.
#[async_trait]
pub trait ConfirmationApi: Send + Sync {
    async fn confirm(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        tracker: &str,
    ) -> anyhow::Result<BookingResponse>;
}

/// Terminal result of one checkout attempt.
#[derive(Debug)]
pub enum CheckoutOutcome {
    Confirmed(Box<BookingResponse>),
    Cancelled,
    Failed(FailureReason),
}

pub struct CheckoutDriver<O: PopupOpener, C: ConfirmationApi> {
    opener: O,
    api: Arc<C>,
    kind: BookingKind,
    booking_id: Uuid,
    checkout_url: String,
    tracker: String,
    app_origin: String,
    poll_interval: Duration,
}

impl<O: PopupOpener, C: ConfirmationApi> CheckoutDriver<O, C> {
    pub fn new(
        opener: O,
        api: Arc<C>,
        kind: BookingKind,
        booking_id: Uuid,
        checkout_url: String,
        tracker: String,
        app_origin: String,
    ) -> Self {
        Self {
            opener,
            api,
            kind,
            booking_id,
            checkout_url,
            tracker,
            app_origin,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs one checkout attempt to a terminal state.
    ///
    /// `messages` is the stream of origin-tagged window messages. The
    /// popup is closed and the poller stopped on every exit path,
    /// including channel teardown.
    pub async fn run(
        self,
        mut messages: mpsc::Receiver<WindowMessage>,
        wizard: &mut BookingWizard,
    ) -> CheckoutOutcome {
        let mut machine = CheckoutMachine::new(self.app_origin.clone(), Some(self.tracker.clone()));
        let mut popup = self.opener.open(&self.checkout_url);
        let mut polling = false;
        let mut confirmed: Option<BookingResponse> = None;

        let opening_signal = if popup.is_some() {
            Signal::PopupOpened
        } else {
            Signal::PopupBlocked
        };
        self.apply(
            &mut machine,
            opening_signal,
            &mut popup,
            &mut polling,
            &mut confirmed,
            wizard,
        )
        .await;

        // First poll lands one full interval after opening, like a
        // browser setInterval.
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !machine.state().is_terminal() {
            // Biased: a delivered message always drains before a close
            // tick is acted on, so a popup that posts success and then
            // closes can never be mistaken for a cancellation.
            tokio::select! {
                biased;
                maybe_message = messages.recv() => {
                    match maybe_message {
                        Some(message) => {
                            self.apply(
                                &mut machine,
                                Signal::Message(message),
                                &mut popup,
                                &mut polling,
                                &mut confirmed,
                                wizard,
                            )
                            .await;
                        }
                        None => {
                            // The surrounding component unmounted.
                            self.apply(
                                &mut machine,
                                Signal::Teardown,
                                &mut popup,
                                &mut polling,
                                &mut confirmed,
                                wizard,
                            )
                            .await;
                            break;
                        }
                    }
                }
                _ = interval.tick(), if polling => {
                    let closed = popup.as_ref().map(|p| p.is_closed()).unwrap_or(true);
                    if closed {
                        self.apply(
                            &mut machine,
                            Signal::PopupClosedTick,
                            &mut popup,
                            &mut polling,
                            &mut confirmed,
                            wizard,
                        )
                        .await;
                    }
                }
            }
        }

        // Leak guard: whatever path ended the loop, the window must be
        // closed. The interval is dropped with this frame.
        if let Some(p) = popup.as_mut() {
            if !p.is_closed() {
                p.close();
            }
        }

        match machine.state() {
            CheckoutState::Confirmed => match confirmed {
                Some(response) => CheckoutOutcome::Confirmed(Box::new(response)),
                None => CheckoutOutcome::Failed(FailureReason::ConfirmRejected(
                    "confirmation response missing".to_string(),
                )),
            },
            CheckoutState::Failed(reason) => CheckoutOutcome::Failed(reason.clone()),
            _ => CheckoutOutcome::Cancelled,
        }
    }

    /// Feeds one signal through the machine and executes the resulting
    /// commands, including any follow-up signals they produce (a
    /// `Confirm` command resolves into `ConfirmSucceeded`/`ConfirmFailed`).
    async fn apply(
        &self,
        machine: &mut CheckoutMachine,
        signal: Signal,
        popup: &mut Option<O::Handle>,
        polling: &mut bool,
        confirmed: &mut Option<BookingResponse>,
        wizard: &mut BookingWizard,
    ) {
        let mut pending = VecDeque::from([signal]);

        while let Some(signal) = pending.pop_front() {
            for command in machine.handle(signal) {
                match command {
                    Command::StartPolling => *polling = true,
                    Command::StopPolling => *polling = false,
                    Command::ClosePopup => {
                        if let Some(p) = popup.as_mut() {
                            if !p.is_closed() {
                                p.close();
                            }
                        }
                    }
                    Command::AdvanceStep => {
                        if let Err(e) = wizard.payment_confirmed() {
                            warn!(error = %e, "wizard step advance rejected");
                        }
                    }
                    Command::Confirm { tracker } => {
                        debug!(booking_id = %self.booking_id, "confirming payment");
                        match self.api.confirm(self.kind, self.booking_id, &tracker).await {
                            Ok(response) => {
                                *confirmed = Some(response);
                                pending.push_back(Signal::ConfirmSucceeded);
                            }
                            Err(e) => {
                                pending.push_back(Signal::ConfirmFailed(e.to_string()));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Reqwest-backed [`ConfirmationApi`] against the booking API.
#[derive(Debug, Clone)]
pub struct HttpConfirmationApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpConfirmationApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ConfirmationApi for HttpConfirmationApi {
    async fn confirm(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        tracker: &str,
    ) -> anyhow::Result<BookingResponse> {
        let url = format!(
            "{}/api/v1/{}/{}/confirm-payment",
            self.base_url.trim_end_matches('/'),
            kind.route_segment(),
            booking_id
        );
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "tracker_token": tracker }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("confirmation rejected with status {}", response.status());
        }

        let envelope: crate::ApiResponse<BookingResponse> = response.json().await?;
        envelope
            .data
            .ok_or_else(|| anyhow::anyhow!("confirmation response carried no booking"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, PaymentStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePopup {
        closed: Arc<AtomicBool>,
    }

    impl Popup for FakePopup {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeOpener {
        blocked: bool,
        closed: Arc<AtomicBool>,
    }

    impl PopupOpener for FakeOpener {
        type Handle = FakePopup;

        fn open(&self, _url: &str) -> Option<FakePopup> {
            if self.blocked {
                None
            } else {
                Some(FakePopup {
                    closed: self.closed.clone(),
                })
            }
        }
    }

    struct FakeApi {
        calls: AtomicUsize,
        fail_with: Mutex<Option<String>>,
    }

    impl FakeApi {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_with: Mutex::new(None),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_with: Mutex::new(Some(reason.to_string())),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfirmationApi for FakeApi {
        async fn confirm(
            &self,
            _kind: BookingKind,
            booking_id: Uuid,
            tracker: &str,
        ) -> anyhow::Result<BookingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = self.fail_with.lock().unwrap().clone() {
                anyhow::bail!(reason);
            }
            Ok(sample_booking(booking_id, tracker))
        }
    }

    fn sample_booking(booking_id: Uuid, tracker: &str) -> BookingResponse {
        let now = chrono::Utc::now();
        BookingResponse {
            id: booking_id,
            reference_number: "CON-2026-0A1B2C".to_string(),
            kind: BookingKind::Consultation,
            offering_id: Uuid::new_v4(),
            fee_amount: dec!(50000),
            currency: "PKR".to_string(),
            customer_name: "Sana Mir".to_string(),
            customer_email: "sana@example.com".to_string(),
            customer_phone: None,
            details: serde_json::json!({}),
            payment_status: PaymentStatus::Paid,
            booking_status: BookingStatus::PaymentConfirmed,
            tracker_token: Some(tracker.to_string()),
            assigned_staff_id: None,
            scheduling_unlocked: true,
            scheduling_completed: false,
            notes: None,
            created_at: now,
            updated_at: Some(now),
            version: 3,
        }
    }

    fn driver(
        opener: FakeOpener,
        api: Arc<FakeApi>,
        kind: BookingKind,
    ) -> CheckoutDriver<FakeOpener, FakeApi> {
        CheckoutDriver::new(
            opener,
            api,
            kind,
            Uuid::new_v4(),
            "https://sandbox.getsafepay.com/checkout/pay?tracker=track_abc".to_string(),
            "track_abc".to_string(),
            "https://app.vakeel.pk".to_string(),
        )
        .with_poll_interval(Duration::from_millis(10))
    }

    fn wizard_at_payment(kind: BookingKind) -> BookingWizard {
        let mut wizard = BookingWizard::new(kind);
        wizard.submit_intake().unwrap();
        wizard.submit_details().unwrap();
        wizard
    }

    fn success_message() -> WindowMessage {
        WindowMessage {
            origin: "https://app.vakeel.pk".to_string(),
            payload: super::super::machine::PopupPayload::PaymentSuccess {
                tracker: "track_abc".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn success_message_confirms_and_advances_wizard() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::succeeding());
        let driver = driver(
            FakeOpener {
                blocked: false,
                closed: closed.clone(),
            },
            api.clone(),
            BookingKind::Consultation,
        );
        let mut wizard = wizard_at_payment(BookingKind::Consultation);

        let (tx, rx) = mpsc::channel(4);
        tx.send(success_message()).await.unwrap();

        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(outcome, CheckoutOutcome::Confirmed(_)));
        assert_eq!(api.call_count(), 1);
        assert!(closed.load(Ordering::SeqCst), "popup must be closed");
        assert_eq!(wizard.step(), super::super::wizard::WizardStep::Scheduling);
    }

    #[tokio::test]
    async fn closed_popup_without_message_cancels_without_confirming() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::succeeding());
        let driver = driver(
            FakeOpener {
                blocked: false,
                closed: closed.clone(),
            },
            api.clone(),
            BookingKind::Registration,
        );
        let mut wizard = wizard_at_payment(BookingKind::Registration);

        let (_tx, rx) = mpsc::channel::<WindowMessage>(4);
        closed.store(true, Ordering::SeqCst);

        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(outcome, CheckoutOutcome::Cancelled));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn popup_closing_right_after_success_still_confirms() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::succeeding());
        let driver = driver(
            FakeOpener {
                blocked: false,
                closed: closed.clone(),
            },
            api.clone(),
            BookingKind::Registration,
        );
        let mut wizard = wizard_at_payment(BookingKind::Registration);

        let (tx, rx) = mpsc::channel(4);
        // The popup posts success and auto-closes before the poller's
        // next tick can observe anything.
        tx.send(success_message()).await.unwrap();
        closed.store(true, Ordering::SeqCst);

        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(outcome, CheckoutOutcome::Confirmed(_)));
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn blocked_popup_fails_without_any_calls() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::succeeding());
        let driver = driver(
            FakeOpener {
                blocked: true,
                closed,
            },
            api.clone(),
            BookingKind::Registration,
        );
        let mut wizard = wizard_at_payment(BookingKind::Registration);

        let (_tx, rx) = mpsc::channel::<WindowMessage>(4);
        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(
            outcome,
            CheckoutOutcome::Failed(FailureReason::PopupBlocked)
        ));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn confirm_rejection_fails_and_closes_popup() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::failing("tracker token does not match"));
        let driver = driver(
            FakeOpener {
                blocked: false,
                closed: closed.clone(),
            },
            api.clone(),
            BookingKind::Registration,
        );
        let mut wizard = wizard_at_payment(BookingKind::Registration);

        let (tx, rx) = mpsc::channel(4);
        tx.send(success_message()).await.unwrap();

        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(
            outcome,
            CheckoutOutcome::Failed(FailureReason::ConfirmRejected(_))
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_message_channel_tears_down_cleanly() {
        let closed = Arc::new(AtomicBool::new(false));
        let api = Arc::new(FakeApi::succeeding());
        let driver = driver(
            FakeOpener {
                blocked: false,
                closed: closed.clone(),
            },
            api.clone(),
            BookingKind::Registration,
        );
        let mut wizard = wizard_at_payment(BookingKind::Registration);

        let (tx, rx) = mpsc::channel::<WindowMessage>(4);
        drop(tx);

        let outcome = driver.run(rx, &mut wizard).await;

        assert!(matches!(outcome, CheckoutOutcome::Cancelled));
        assert!(closed.load(Ordering::SeqCst), "teardown must close the popup");
        assert_eq!(api.call_count(), 0);
    }
}
