//! Bearer token verification
//!
//! Tokens are issued by the platform's auth service (HS256, shared secret);
//! this subsystem only verifies them. Expired and malformed tokens are
//! distinguished so the gateway can report the right rejection reason.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::store::UserId;

/// Token verifier configuration
#[derive(Clone)]
pub struct VerifierConfig {
    /// Shared secret the auth service signs with
    pub secret: String,
    /// Expected token issuer
    pub issuer: String,
}

impl VerifierConfig {
    /// Create a new verifier configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "huddle".to_string(),
        }
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// Token verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token decoding failed: {0}")]
    DecodingError(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::InvalidToken | ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerifyError::InvalidToken
            }
            _ => VerifyError::DecodingError(err.to_string()),
        }
    }
}

/// Claims carried by platform access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID, stringified by the issuer)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Get the user ID carried in `sub`
    pub fn user_id(&self) -> Result<UserId, VerifyError> {
        self.sub.parse().map_err(|_| VerifyError::InvalidToken)
    }
}

/// Verifies bearer tokens presented at the websocket handshake
#[derive(Clone)]
pub struct TokenVerifier {
    config: VerifierConfig,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    /// Create a new token verifier
    pub fn new(config: VerifierConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            decoding_key,
        }
    }

    /// Validate a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Validate a token and return the user ID it authenticates
    pub fn verify_user(&self, token: &str) -> Result<UserId, VerifyError> {
        self.verify(token)?.user_id()
    }
}
