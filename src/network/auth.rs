//! JWT Authentication
//!
//! Validates tokens issued by an external identity provider; the server
//! never issues tokens itself. A validated subject claim is mapped to the
//! 16-byte participant id used throughout the exchange core.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::exchange::state::ParticipantId;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer is accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience is accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Skip expiry validation. Testing only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Build from `AUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Whether any key material is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        if let Some(ref pem) = self.public_key_pem {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::Decode(format!("invalid public key: {}", e)))?;
            Ok((key, Algorithm::RS256))
        } else if let Some(ref secret) = self.secret {
            Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256))
        } else {
            Err(AuthError::NotConfigured)
        }
    }
}

/// Claims we expect from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the provider-side user id.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued-at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Derive the deterministic participant id for this subject:
    /// SHA-256 over a domain-separated subject string, truncated to 16 bytes.
    pub fn participant_id(&self) -> ParticipantId {
        let mut hasher = Sha256::new();
        hasher.update(b"sealswap-participant:");
        hasher.update(self.sub.as_bytes());
        let digest = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        ParticipantId::new(id)
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No key material configured on the server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match the expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// A required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Other JWT decoding failure.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Validate a token against `config` and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let (key, algorithm) = config.decoding_key()?;

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();
    validation.validate_exp = !config.skip_expiry;

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    match config.audience {
        Some(ref audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data: TokenData<TokenClaims> =
        decode(token, &key, &validation).map_err(map_jwt_error)?;

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }
    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::Decode(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret-key-256-bits-long!!";

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn fresh_claims() -> TokenClaims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        TokenClaims {
            sub: "alice".into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: None,
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_token_accepted() {
        let token = sign(&fresh_claims(), SECRET);
        let claims = validate_token(&token, &secret_config()).unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = fresh_claims();
        claims.exp = 1;
        let token = sign(&claims, SECRET);

        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_skip_expiry_accepts_stale_token() {
        let mut claims = fresh_claims();
        claims.exp = 1;
        let token = sign(&claims, SECRET);

        let config = AuthConfig {
            skip_expiry: true,
            ..secret_config()
        };
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(&fresh_claims(), "some-other-secret-entirely!!");
        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = sign(&fresh_claims(), SECRET);
        let config = AuthConfig {
            issuer: Some("someone-else".into()),
            ..secret_config()
        };
        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_empty_subject_rejected() {
        let mut claims = fresh_claims();
        claims.sub = String::new();
        let token = sign(&claims, SECRET);

        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_unconfigured_server_rejects() {
        let result = validate_token("a.b.c", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_participant_id_is_deterministic_per_subject() {
        let claims = fresh_claims();
        assert_eq!(claims.participant_id(), claims.participant_id());

        let other = TokenClaims {
            sub: "bob".into(),
            ..fresh_claims()
        };
        assert_ne!(claims.participant_id(), other.participant_id());
    }
}
