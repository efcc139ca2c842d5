//! Staff authentication.
//!
//! Guest-facing endpoints (intake, payment, status lookup) are public;
//! everything that reads or mutates bookings beyond the guest surface
//! requires a staff bearer token. Tokens are stateless JWTs signed with
//! the configured secret.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

pub const ISSUER: &str = "vakeel-auth";
pub const AUDIENCE: &str = "vakeel-api";

const STAFF_ROLES: &[&str] = &["staff", "admin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (staff user id)
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    /// JWT ID, unique per issued token
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Staff member extracted from a validated bearer token.
///
/// Using this as a handler argument is what marks a route as
/// staff-only; requests without a valid token with a staff role are
/// rejected before the handler body runs.
#[derive(Debug, Clone)]
pub struct StaffUser {
    pub user_id: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
}

impl StaffUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing authorization header".to_string())
            })?;

        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::Unauthorized("expected a bearer token".to_string())
            })?;

        let claims = validate_token(token, &state.config.jwt_secret)?;

        if !claims
            .roles
            .iter()
            .any(|role| STAFF_ROLES.contains(&role.as_str()))
        {
            return Err(ServiceError::Forbidden(
                "staff access required".to_string(),
            ));
        }

        Ok(StaffUser {
            user_id: claims.sub,
            name: claims.name,
            roles: claims.roles,
        })
    }
}

/// Validates a bearer token and returns its claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_audience(&[AUDIENCE]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
}

/// Issues a staff token. Used by the seeding CLI and the test harness;
/// interactive login lives in the separate identity service.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: &str,
    roles: &[&str],
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        name: Some(name.to_string()),
        email: None,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        nbf: now.timestamp(),
        iss: ISSUER.to_string(),
        aud: AUDIENCE.to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("token encoding: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit_test_secret_key_that_is_long_enough_for_hs256_purposes_here";

    #[test]
    fn issued_tokens_validate() {
        let token = issue_token(
            SECRET,
            Uuid::new_v4(),
            "Hira Baig",
            &["staff"],
            Duration::hours(1),
        )
        .unwrap();

        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.roles, vec!["staff"]);
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(
            SECRET,
            Uuid::new_v4(),
            "Hira Baig",
            &["staff"],
            Duration::hours(1),
        )
        .unwrap();

        let err = validate_token(&token, "another_secret_that_is_also_long_enough_for_hs256_use")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token(
            SECRET,
            Uuid::new_v4(),
            "Hira Baig",
            &["staff"],
            Duration::seconds(-30),
        )
        .unwrap();

        assert!(validate_token(&token, SECRET).is_err());
    }
}
