//! Bearer token verification.
//!
//! # Responsibilities
//! - Parse `Authorization: Bearer <token>` header values
//! - Pin the signing algorithm before any signature check
//! - Verify HMAC signatures against the shared secret
//! - Reject expired tokens with no leeway
//!
//! # Design Decisions
//! - The token header's `alg` must equal the configured algorithm exactly;
//!   a different algorithm is refused even if it would verify
//! - Error variants are for logs only; callers surface one generic 401

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::config::validation::ValidationError;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a bearer credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    Missing,
    #[error("authorization header malformed")]
    Malformed,
    #[error("token declares an unexpected signing algorithm")]
    UnexpectedAlgorithm,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// Identity carried by a verified token. Lives only for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, alias = "userId")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Map a configured algorithm name to an HMAC algorithm. Asymmetric names yield `None`.
pub fn parse_symmetric_algorithm(name: &str) -> Option<Algorithm> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        _ => None,
    }
}

/// Verifies bearer tokens signed with a single shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    pub fn new(secret: &[u8], algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret),
            algorithm,
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ValidationError> {
        if config.jwt_secret.is_empty() {
            return Err(ValidationError::EmptySecret);
        }
        let algorithm = parse_symmetric_algorithm(&config.algorithm)
            .ok_or_else(|| ValidationError::Algorithm(config.algorithm.clone()))?;
        Ok(Self::new(config.jwt_secret.as_bytes(), algorithm))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Validate a raw `Authorization` header value.
    pub fn validate(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Malformed)?;
        self.verify_token(token)
    }

    /// Verify a bare token: algorithm, then signature, then expiry.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        if header.alg != self.algorithm {
            return Err(AuthError::UnexpectedAlgorithm);
        }

        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidAlgorithm => AuthError::UnexpectedAlgorithm,
                _ => AuthError::Malformed,
            })
    }
}
