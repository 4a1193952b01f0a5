use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{AuthError, TokenService};
use crate::core_types::AccountId;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (account id as string)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

/// HS256 JWT issuer/verifier
pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl JwtTokenService {
    pub fn new(secret: &str, expiry_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::seconds(expiry_secs),
        }
    }

    /// Decode and validate signature + expiry
    pub fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(token_data.claims)
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, account_id: AccountId) -> Result<String, AuthError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(self.expiry)
            .ok_or_else(|| AuthError::Issue("expiry out of range".to_string()))?;

        let claims = Claims {
            sub: account_id.to_string(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<AccountId, AuthError> {
        self.decode_claims(token)?
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let svc = JwtTokenService::new("test-secret", 3600);
        let token = svc.issue(42).unwrap();
        assert_eq!(svc.verify(&token), Ok(42));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtTokenService::new("secret-a", 3600);
        let verifier = JwtTokenService::new("secret-b", 3600);
        let token = issuer.issue(1).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Well past the default 60s leeway
        let svc = JwtTokenService::new("test-secret", -3600);
        let token = svc.issue(1).unwrap();
        assert_eq!(svc.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_rejected() {
        let svc = JwtTokenService::new("test-secret", 3600);
        assert_eq!(svc.verify("not.a.jwt"), Err(AuthError::InvalidToken));
    }
}
