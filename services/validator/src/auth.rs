use std::collections::HashMap;
use std::time::Duration;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::error::ApiError;
use crate::state::SharedState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Inactive user")]
    Inactive,

    #[error("invalid user entry {0:?}: expected name:bcrypt_hash[:disabled]")]
    BadUserEntry(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// One configured account. Passwords are kept as bcrypt hashes.
#[derive(Clone, Debug)]
pub struct UserEntry {
    pub username: String,
    password_hash: String,
    pub disabled: bool,
}

/// Parses `AUTH_USERS`: comma-separated `name:bcrypt_hash` entries, each
/// optionally suffixed with `:disabled`. bcrypt hashes (`$2b$12$...`) contain
/// neither separator.
pub fn parse_users(raw: &str) -> Result<Vec<UserEntry>, AuthError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let bad = || AuthError::BadUserEntry(entry.to_string());
            let mut parts = entry.split(':');
            let username = parts.next().filter(|u| !u.is_empty()).ok_or_else(bad)?;
            let hash = parts.next().filter(|h| is_bcrypt_hash(h)).ok_or_else(bad)?;
            let disabled = match parts.next() {
                None => false,
                Some("disabled") => true,
                Some(_) => return Err(bad()),
            };
            if parts.next().is_some() {
                return Err(bad());
            }
            Ok(UserEntry { username: username.to_string(), password_hash: hash.to_string(), disabled })
        })
        .collect()
}

fn is_bcrypt_hash(h: &str) -> bool {
    h.len() == 60 && ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|p| h.starts_with(p))
}

/// bcrypt hash suitable for an `AUTH_USERS` entry.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with_cost(password, bcrypt::DEFAULT_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Public view of an account, as returned by `/auth/me`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub disabled: bool,
}

impl From<&UserEntry> for User {
    fn from(u: &UserEntry) -> Self {
        User { username: u.username.clone(), full_name: None, email: None, disabled: u.disabled }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Checks passwords and issues / verifies signed bearer tokens.
///
/// Token layout: `base64url(claims JSON) "." hex(HMAC-SHA256(secret, first part))`.
pub struct Authenticator {
    users: HashMap<String, UserEntry>,
    secret: Vec<u8>,
    ttl: Duration,
}

impl Authenticator {
    pub fn new(users: Vec<UserEntry>, secret: &str, ttl: Duration) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.username.clone(), u)).collect(),
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<&UserEntry, AuthError> {
        let user = self.users.get(username).ok_or(AuthError::InvalidCredentials)?;
        // A malformed stored hash reads as a mismatch.
        if !bcrypt::verify(password, &user.password_hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    pub fn issue_token(&self, username: &str, now: DateTime<Utc>) -> IssuedToken {
        let claims = Claims { sub: username.to_string(), exp: now.timestamp() + self.ttl.as_secs() as i64 };
        // Serializing a struct of a String and an i64 cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let sig = hex::encode(self.mac(&payload).finalize().into_bytes());
        IssuedToken {
            access_token: format!("{payload}.{sig}"),
            token_type: "bearer".to_string(),
            expires_in: self.ttl.as_secs(),
        }
    }

    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let (payload, sig) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let sig = hex::decode(sig).map_err(|_| AuthError::InvalidToken)?;
        self.mac(payload).verify_slice(&sig).map_err(|_| AuthError::InvalidToken)?;

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| AuthError::InvalidToken)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| AuthError::InvalidToken)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Resolves a token to an active user.
    pub fn current_user(&self, token: &str, now: DateTime<Utc>) -> Result<User, AuthError> {
        let claims = self.verify_token(token, now)?;
        let user = self.users.get(&claims.sub).ok_or(AuthError::InvalidToken)?;
        if user.disabled {
            return Err(AuthError::Inactive);
        }
        Ok(User::from(user))
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC can take any key length");
        mac.update(payload.as_bytes());
        mac
    }
}

/// The authenticated, active caller of a protected route.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".into()))?;

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            _ => return Err(ApiError::Unauthorized("Not authenticated".into())),
        };

        let user = state.auth.current_user(token, Utc::now())?;
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pw: &str) -> String {
        hash_password_with_cost(pw, 4).unwrap()
    }

    fn authn() -> Authenticator {
        let raw = format!("alice:{},bob:{}:disabled", hash("wonderland"), hash("builder"));
        Authenticator::new(parse_users(&raw).unwrap(), "test-secret-key-0123456789", Duration::from_secs(1800))
    }

    #[test]
    fn test_parse_users() {
        let users = parse_users(&format!(" carol:{} , ", hash("x"))).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "carol");
        assert!(!users[0].disabled);

        assert!(parse_users("nodigest").is_err());
        assert!(parse_users("dave:abcd").is_err());
        // unsalted hex digests are no longer accepted
        assert!(parse_users(&format!("frank:{}", "ab".repeat(32))).is_err());
        assert!(parse_users(&format!("erin:{}:admin", hash("x"))).is_err());
        assert!(parse_users("").unwrap().is_empty());
    }

    #[test]
    fn test_password_check() {
        let a = authn();
        assert!(a.authenticate("alice", "wonderland").is_ok());
        assert_eq!(a.authenticate("alice", "nope").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(a.authenticate("mallory", "wonderland").unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn test_hashes_are_salted() {
        let (a, b) = (hash("same"), hash("same"));
        assert_ne!(a, b);
        assert!(bcrypt::verify("same", &a).unwrap());
        assert!(bcrypt::verify("same", &b).unwrap());
        assert!(hash_password("x").unwrap().starts_with("$2b$12$"));
    }

    #[test]
    fn test_token_round_trip_and_expiry() {
        let a = authn();
        let now = Utc::now();
        let t = a.issue_token("alice", now);
        assert_eq!(t.token_type, "bearer");
        assert_eq!(t.expires_in, 1800);

        let claims = a.verify_token(&t.access_token, now).unwrap();
        assert_eq!(claims.sub, "alice");

        let later = now + chrono::Duration::seconds(1801);
        assert_eq!(a.verify_token(&t.access_token, later).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let a = authn();
        let now = Utc::now();
        let t = a.issue_token("alice", now).access_token;
        let (_, sig) = t.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"bob","exp":9999999999}"#);
        let forged = format!("{forged_claims}.{sig}");
        assert_eq!(a.verify_token(&forged, now).unwrap_err(), AuthError::InvalidToken);

        let other = Authenticator::new(vec![], "a-different-secret-entirely", Duration::from_secs(60));
        assert_eq!(other.verify_token(&t, now).unwrap_err(), AuthError::InvalidToken);
        assert_eq!(a.verify_token("garbage", now).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_disabled_and_unknown_users() {
        let a = authn();
        let now = Utc::now();
        let bob = a.issue_token("bob", now).access_token;
        assert_eq!(a.current_user(&bob, now).unwrap_err(), AuthError::Inactive);

        let ghost = a.issue_token("ghost", now).access_token;
        assert_eq!(a.current_user(&ghost, now).unwrap_err(), AuthError::InvalidToken);
    }
}
