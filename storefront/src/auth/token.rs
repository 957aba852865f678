use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorefrontError};

/// Session token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// Issues and checks HS256-signed, time-limited session tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
            validation,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a token for `subject` that expires after the configured lifetime
    pub fn issue(&self, subject: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp().max(0) as usize,
            exp: (now + self.lifetime).timestamp().max(0) as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StorefrontError::internal(format!("failed to sign token: {}", e)))
    }

    /// Check signature, shape and expiry; return the subject
    pub fn validate(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "signature mismatch",
                _ => "malformed token",
            };
            StorefrontError::InvalidToken(reason.to_string())
        })?;

        Ok(data.claims.sub)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::minutes(30))
    }

    #[test]
    fn test_issue_then_validate() {
        let tokens = issuer();
        let token = tokens.issue("alice").unwrap();
        assert_eq!(tokens.validate(&token).unwrap(), "alice");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = TokenIssuer::new("test-secret", Duration::minutes(-5));
        let token = tokens.issue("alice").unwrap();

        match tokens.validate(&token) {
            Err(StorefrontError::InvalidToken(reason)) => assert_eq!(reason, "token expired"),
            other => panic!("expected expiry failure, got {other:?}"),
        }
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let token = TokenIssuer::new("other-secret", Duration::minutes(30)).issue("alice").unwrap();

        match issuer().validate(&token) {
            Err(StorefrontError::InvalidToken(reason)) => assert_eq!(reason, "signature mismatch"),
            other => panic!("expected signature failure, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        for token in ["", "abc", "a.b.c"] {
            assert!(matches!(issuer().validate(token), Err(StorefrontError::InvalidToken(_))));
        }
    }

    #[test]
    fn test_debug_hides_keys() {
        let rendered = format!("{:?}", issuer());
        assert!(!rendered.contains("test-secret"));
    }
}
