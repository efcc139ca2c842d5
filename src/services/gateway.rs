use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    /// Booking id, carried by the gateway as the order reference.
    pub order_id: Uuid,
    /// Charge amount in minor units (paisa for PKR).
    pub amount_minor: i64,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// A live hosted checkout session. Gateway-owned and ephemeral; the
/// booking only keeps the tracker token as a back-reference.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub tracker_token: String,
    pub checkout_url: String,
}

/// Settlement state reported by the gateway for one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Completed,
    Failed,
}

/// Gateway-side view of a checkout session, fetched during
/// confirmation. Amount and currency are echoed back so the caller can
/// cross-check them against the booking's fee snapshot.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub tracker_token: String,
    pub state: SessionState,
    pub amount_minor: i64,
    pub currency: String,
}

/// Hosted payment gateway operations used by the payment service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn verify_session(&self, tracker_token: &str) -> Result<VerifiedSession, ServiceError>;
}

// Wire types for the Safepay-style REST API.

#[derive(Debug, Serialize)]
struct InitRequestBody<'a> {
    client: &'a str,
    amount: i64,
    currency: &'a str,
    environment: &'a str,
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct InitResponseBody {
    data: InitResponseData,
}

#[derive(Debug, Deserialize)]
struct InitResponseData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct FetchResponseBody {
    data: FetchResponseData,
}

#[derive(Debug, Deserialize)]
struct FetchResponseData {
    token: String,
    state: SessionState,
    amount: i64,
    currency: String,
    /// HMAC-SHA256 of the token, keyed with the shared secret.
    signature: String,
}

/// Reqwest-backed client for a Safepay-style hosted checkout gateway.
#[derive(Debug, Clone)]
pub struct SafepayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl SafepayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn checkout_url_for(&self, tracker_token: &str, request: &CreateSessionRequest) -> Result<String, ServiceError> {
        let mut url = Url::parse(&self.config.checkout_url)
            .map_err(|e| ServiceError::InternalError(format!("checkout url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("tracker", tracker_token)
            .append_pair("env", &self.config.environment)
            .append_pair("source", "hosted")
            .append_pair("redirect_url", &request.return_url)
            .append_pair("cancel_url", &request.cancel_url);
        Ok(url.into())
    }

    fn verify_signature(&self, token: &str, signature: &str) -> Result<(), ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.config.secret_key.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("hmac key: {}", e)))?;
        mac.update(token.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        if expected.eq_ignore_ascii_case(signature) {
            Ok(())
        } else {
            warn!(tracker = %token, "gateway response signature mismatch");
            Err(ServiceError::GatewayError(
                "transaction signature mismatch".to_string(),
            ))
        }
    }
}

#[async_trait]
impl PaymentGateway for SafepayClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let endpoint = format!("{}/order/v1/init", self.config.base_url.trim_end_matches('/'));
        let body = InitRequestBody {
            client: &self.config.api_key,
            amount: request.amount_minor,
            currency: &request.currency,
            environment: &self.config.environment,
            order_id: request.order_id.to_string(),
        };

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "checkout session init request failed");
                ServiceError::GatewayError(format!("session init failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "gateway rejected session init");
            return Err(ServiceError::GatewayError(format!(
                "session init rejected with status {}",
                status
            )));
        }

        let parsed: InitResponseBody = response.json().await.map_err(|e| {
            error!(error = %e, "malformed session init response");
            ServiceError::GatewayError("malformed session init response".to_string())
        })?;

        let checkout_url = self.checkout_url_for(&parsed.data.token, &request)?;
        Ok(CheckoutSession {
            tracker_token: parsed.data.token,
            checkout_url,
        })
    }

    #[instrument(skip(self))]
    async fn verify_session(&self, tracker_token: &str) -> Result<VerifiedSession, ServiceError> {
        let endpoint = format!(
            "{}/order/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            tracker_token
        );

        let response = self
            .http
            .get(&endpoint)
            .header("X-SFPY-MERCHANT-SECRET", &self.config.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "session verification request failed");
                ServiceError::GatewayError(format!("verification failed: {}", e))
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::GatewayError(
                "unknown tracker token".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "gateway rejected session verification");
            return Err(ServiceError::GatewayError(format!(
                "verification rejected with status {}",
                status
            )));
        }

        let parsed: FetchResponseBody = response.json().await.map_err(|e| {
            error!(error = %e, "malformed verification response");
            ServiceError::GatewayError("malformed verification response".to_string())
        })?;

        self.verify_signature(&parsed.data.token, &parsed.data.signature)?;

        Ok(VerifiedSession {
            tracker_token: parsed.data.token,
            state: parsed.data.state,
            amount_minor: parsed.data.amount,
            currency: parsed.data.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> GatewayConfig {
        GatewayConfig {
            checkout_url: "https://sandbox.getsafepay.com/checkout/pay".to_string(),
            base_url,
            api_key: "sec_test_key".to_string(),
            secret_key: "test_secret_key_0123456789abcdef".to_string(),
            environment: "sandbox".to_string(),
            timeout_secs: 5,
        }
    }

    fn sign(secret: &str, token: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn session_request() -> CreateSessionRequest {
        CreateSessionRequest {
            order_id: Uuid::new_v4(),
            amount_minor: 5_000_000,
            currency: "PKR".to_string(),
            return_url: "http://localhost:3000/payment/return".to_string(),
            cancel_url: "http://localhost:3000/payment/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn create_session_returns_tracker_and_checkout_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order/v1/init"))
            .and(body_partial_json(serde_json::json!({
                "amount": 5_000_000,
                "currency": "PKR",
                "environment": "sandbox"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "token": "track_7f3a2b" }
            })))
            .mount(&server)
            .await;

        let client = SafepayClient::new(test_config(server.uri())).unwrap();
        let session = client.create_session(session_request()).await.unwrap();

        assert_eq!(session.tracker_token, "track_7f3a2b");
        let url = Url::parse(&session.checkout_url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("tracker").unwrap(), "track_7f3a2b");
        assert_eq!(pairs.get("env").unwrap(), "sandbox");
    }

    #[tokio::test]
    async fn create_session_maps_server_error_to_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order/v1/init"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = SafepayClient::new(test_config(server.uri())).unwrap();
        let err = client.create_session(session_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }

    #[tokio::test]
    async fn verify_session_checks_signature() {
        let server = MockServer::start().await;
        let config = test_config(server.uri());
        let signature = sign(&config.secret_key, "track_7f3a2b");

        Mock::given(method("GET"))
            .and(path("/order/v1/track_7f3a2b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "token": "track_7f3a2b",
                    "state": "completed",
                    "amount": 5_000_000,
                    "currency": "PKR",
                    "signature": signature
                }
            })))
            .mount(&server)
            .await;

        let client = SafepayClient::new(config).unwrap();
        let verified = client.verify_session("track_7f3a2b").await.unwrap();
        assert_eq!(verified.state, SessionState::Completed);
        assert_eq!(verified.amount_minor, 5_000_000);
    }

    #[tokio::test]
    async fn verify_session_rejects_bad_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/order/v1/track_7f3a2b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "token": "track_7f3a2b",
                    "state": "completed",
                    "amount": 5_000_000,
                    "currency": "PKR",
                    "signature": "deadbeef"
                }
            })))
            .mount(&server)
            .await;

        let client = SafepayClient::new(test_config(server.uri())).unwrap();
        let err = client.verify_session("track_7f3a2b").await.unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }

    #[tokio::test]
    async fn verify_session_maps_unknown_tracker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/order/v1/track_missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SafepayClient::new(test_config(server.uri())).unwrap();
        let err = client.verify_session("track_missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }
}
