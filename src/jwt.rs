use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::authz::AuthFailure;
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        if secret.is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours))
    }

    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        self.encode_at(user_id, Utc::now())
    }

    /// Issues a token as if signed at `issued_at`.
    pub fn encode_at(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let exp = issued_at + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: user_id,
            exp: exp.timestamp().max(0) as usize,
            iat: issued_at.timestamp().max(0) as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::internal(format!("failed to sign token: {err}")))
    }

    /// Verifies signature and expiry. An elapsed `exp` is `TokenExpired`;
    /// every other verification error is `TokenInvalid`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthFailure> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthFailure::TokenExpired,
                kind => {
                    tracing::debug!(error = ?kind, "token rejected");
                    AuthFailure::TokenInvalid
                }
            })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}
