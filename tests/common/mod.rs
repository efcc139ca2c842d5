use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use vakeel_api::{
    auth,
    config::{AppConfig, GatewayConfig},
    db::{self, DbConfig},
    entities::offering,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    migrator,
    models::BookingKind,
    notifications::LogNotifier,
    services::gateway::{
        CheckoutSession, CreateSessionRequest, PaymentGateway, SessionState, VerifiedSession,
    },
    AppState,
};

const TEST_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// What the fake gateway does when asked to create a session.
#[derive(Debug, Clone)]
pub enum CreateBehavior {
    Succeed { tracker: String },
    Fail,
}

/// What the fake gateway reports when asked to verify a tracker.
#[derive(Debug, Clone)]
pub enum VerifyBehavior {
    Completed { amount_minor: i64, currency: String },
    Pending,
    Declined,
    Error,
}

/// Programmable in-process stand-in for the hosted payment gateway.
/// Records every call so tests can assert on amounts and call counts.
pub struct FakeGateway {
    create_behavior: Mutex<CreateBehavior>,
    verify_behavior: Mutex<VerifyBehavior>,
    create_requests: Mutex<Vec<CreateSessionRequest>>,
    verify_calls: AtomicUsize,
}

// Not every suite exercises every knob.
#[allow(dead_code)]
impl FakeGateway {
    pub fn new() -> Self {
        Self {
            create_behavior: Mutex::new(CreateBehavior::Succeed {
                tracker: "track_test_1".to_string(),
            }),
            verify_behavior: Mutex::new(VerifyBehavior::Completed {
                amount_minor: 5_000_000,
                currency: "PKR".to_string(),
            }),
            create_requests: Mutex::new(Vec::new()),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_create(&self, behavior: CreateBehavior) {
        *self.create_behavior.lock().unwrap() = behavior;
    }

    pub fn set_verify(&self, behavior: VerifyBehavior) {
        *self.verify_behavior.lock().unwrap() = behavior;
    }

    pub fn create_requests(&self) -> Vec<CreateSessionRequest> {
        self.create_requests.lock().unwrap().clone()
    }

    pub fn verify_call_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        self.create_requests.lock().unwrap().push(request);
        match self.create_behavior.lock().unwrap().clone() {
            CreateBehavior::Succeed { tracker } => Ok(CheckoutSession {
                checkout_url: format!(
                    "https://sandbox.getsafepay.com/checkout/pay?tracker={}",
                    tracker
                ),
                tracker_token: tracker,
            }),
            CreateBehavior::Fail => Err(ServiceError::GatewayError(
                "session init rejected with status 503".to_string(),
            )),
        }
    }

    async fn verify_session(&self, tracker_token: &str) -> Result<VerifiedSession, ServiceError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_behavior.lock().unwrap().clone() {
            VerifyBehavior::Completed {
                amount_minor,
                currency,
            } => Ok(VerifiedSession {
                tracker_token: tracker_token.to_string(),
                state: SessionState::Completed,
                amount_minor,
                currency,
            }),
            VerifyBehavior::Pending => Ok(VerifiedSession {
                tracker_token: tracker_token.to_string(),
                state: SessionState::Pending,
                amount_minor: 0,
                currency: "PKR".to_string(),
            }),
            VerifyBehavior::Declined => Ok(VerifiedSession {
                tracker_token: tracker_token.to_string(),
                state: SessionState::Failed,
                amount_minor: 0,
                currency: "PKR".to_string(),
            }),
            VerifyBehavior::Error => Err(ServiceError::GatewayError(
                "verification rejected with status 500".to_string(),
            )),
        }
    }
}

/// Helper harness backed by an in-memory SQLite database and the fake
/// gateway, exposing the real router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();

        // A single pooled connection keeps every query on the same
        // in-memory SQLite database.
        let pool = db::establish_connection(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..DbConfig::default()
        })
        .await
        .expect("failed to create test database");

        migrator::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx, Arc::new(LogNotifier)));

        let gateway = Arc::new(FakeGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
            cfg.app_origin.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            event_sender,
            services,
        };

        let token = auth::issue_token(
            &cfg.jwt_secret,
            Uuid::new_v4(),
            "Test Staff",
            &["staff"],
            chrono::Duration::hours(1),
        )
        .expect("issue staff token for tests");

        let router = Router::new()
            .nest("/health", vakeel_api::handlers::health::health_routes())
            .nest("/api/v1", vakeel_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            token,
            _event_task: event_task,
        }
    }

    /// Access the bearer token for the default staff user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Inserts a catalog offering and returns its model.
    pub async fn seed_offering(
        &self,
        kind: BookingKind,
        slug: &str,
        fee: Decimal,
    ) -> offering::Model {
        let now = Utc::now();
        offering::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(kind.to_string()),
            name: Set(format!("Test offering {}", slug)),
            slug: Set(slug.to_string()),
            description: Set(None),
            fee: Set(fee),
            currency: Set("PKR".to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed offering for tests")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for staff-authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.token())).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "info".to_string(),
        log_json: false,
        app_origin: "http://localhost:3000".to_string(),
        cors_allowed_origins: None,
        db_max_connections: 1,
        db_min_connections: 1,
        auto_migrate: true,
        gateway: GatewayConfig::default(),
    }
}

/// Reads the response status and parses the JSON body.
pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not valid json")
    };
    (status, value)
}
