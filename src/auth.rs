use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::Role,
};

/// Claims
///
/// Payload of the bearer token. Signed with the server-held secret on register/login and
/// validated on every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The id of the user the token was issued to.
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// The user's role at issue time. Roles never change, so this stays authoritative.
    pub role: Role,
    /// Issued At (iat).
    pub iat: usize,
    /// Expiration Time (exp). Enforced on decode.
    pub exp: usize,
}

/// issue_token
///
/// Signs a token for `user_id`/`role` that expires `ttl_days` from now. A lifetime whose
/// expiry falls outside chrono's range is an internal error.
pub fn issue_token(
    user_id: Uuid,
    role: Role,
    secret: &str,
    ttl_days: i64,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let expires_at = TimeDelta::try_days(ttl_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| ApiError::internal(format!("token lifetime out of range: {ttl_days} days")))?;

    let claims = Claims {
        user_id,
        role,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))
}

/// verify_token
///
/// Takes the raw `Authorization` header value. Returns `None` when the header is absent,
/// lacks the `Bearer ` prefix, or carries a token with a bad signature, a bad shape, or an
/// elapsed expiry. Never fails any harder than that.
pub fn verify_token(authorization: Option<&str>, secret: &str) -> Option<Claims> {
    let token = authorization?.strip_prefix("Bearer ")?;

    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!(reason = ?other, "rejected invalid token"),
            }
            None
        }
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an argument;
/// its presence guarantees the bearer token was valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// require
    ///
    /// Capability check shared by every role-gated handler: passes when the caller holds
    /// one of `allowed`, otherwise yields a 403 carrying `message`.
    pub fn require(&self, allowed: &[Role], message: &str) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(message))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.user_id,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reads the `Authorization` header, verifies it against the configured secret and yields
/// the caller's identity. Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        verify_token(authorization, &config.jwt_secret)
            .map(AuthUser::from)
            .ok_or(ApiError::Unauthenticated)
    }
}
