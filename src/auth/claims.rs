use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of a short-lived access token. Identity only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,      // user ID
    pub iat: i64,       // issued at (unix timestamp)
    pub exp: i64,       // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub jti: Uuid,      // unique per token
    pub kind: TokenKind,
}

/// Payload of a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,
    pub kind: TokenKind,
}

/// Identity fields embedded into a refresh token.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSubject<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub email: &'a str,
    pub fullname: &'a str,
}

pub(crate) trait KindedClaims {
    fn kind(&self) -> TokenKind;
}

impl KindedClaims for AccessClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl KindedClaims for RefreshClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}
