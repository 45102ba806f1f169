use crate::domain::ports::TokenIssuer;
use crate::domain::session::TokenClaims;
use crate::error::{AuthFailure, Result, VendingError};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_SUBJECT: &str = "authorization_token";
const TOKEN_AUDIENCE: &str = "vendingmachine";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
    jti: String,
    username: String,
}

/// HS256 bearer tokens with a fixed validity window.
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtTokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: TOKEN_SUBJECT.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            username: username.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| VendingError::storage(format!("failed to sign token: {e}")))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::InvalidSignature => "bad signature".to_string(),
                _ => "malformed token".to_string(),
            };
            AuthFailure::InvalidToken(reason)
        })?;

        let claims = data.claims;
        if claims.sub != TOKEN_SUBJECT {
            return Err(AuthFailure::InvalidToken("unexpected subject".to_string()).into());
        }
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthFailure::InvalidToken("expiry out of range".to_string()))?;

        Ok(TokenClaims {
            username: claims.username,
            expires_at,
        })
    }
}
