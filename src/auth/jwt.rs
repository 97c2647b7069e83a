use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{AccessClaims, KindedClaims, RefreshClaims, RefreshSubject, TokenKind};
use crate::config::JwtConfig;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience => TokenError::SignatureInvalid,
            _ => TokenError::Malformed,
        }
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDuration,
}

impl KeyPair {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: TimeDuration::minutes(ttl_minutes),
        }
    }
}

/// Signs and verifies access and refresh JWTs, each with its own secret
/// and lifetime.
#[derive(Clone)]
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&cfg.access_secret, cfg.access_ttl_minutes),
            refresh: KeyPair::new(&cfg.refresh_secret, cfg.refresh_ttl_minutes),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    fn window(&self, kind: TokenKind) -> (i64, i64) {
        let ttl = match kind {
            TokenKind::Access => self.access.ttl,
            TokenKind::Refresh => self.refresh.ttl,
        };
        let now = OffsetDateTime::now_utc();
        (now.unix_timestamp(), (now + ttl).unix_timestamp())
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        let (iat, exp) = self.window(TokenKind::Access);
        let claims = AccessClaims {
            sub: user_id,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        debug!(user_id = %user_id, "access token signed");
        Ok(token)
    }

    pub fn issue_refresh(&self, subject: RefreshSubject<'_>) -> Result<String, TokenError> {
        let (iat, exp) = self.window(TokenKind::Refresh);
        let claims = RefreshClaims {
            sub: subject.id,
            username: subject.username.to_string(),
            email: subject.email.to_string(),
            fullname: subject.fullname.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Refresh,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        debug!(user_id = %subject.id, "refresh token signed");
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access.decoding, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh.decoding, TokenKind::Refresh)
    }

    fn verify<C>(&self, token: &str, key: &DecodingKey, expected: TokenKind) -> Result<C, TokenError>
    where
        C: DeserializeOwned + KindedClaims,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<C>(token, key, &validation)?;
        if data.claims.kind() != expected {
            return Err(TokenError::WrongKind { expected });
        }
        debug!(kind = ?expected, "jwt verified");
        Ok(data.claims)
    }
}
