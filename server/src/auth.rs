//! Password credentials and bearer sessions.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sabong_types::UserId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or invalid session token")]
    Unauthorized,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    Disabled,
    #[error("password must be {MIN_PASSWORD_CHARS} to {MAX_PASSWORD_CHARS} characters")]
    WeakPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let chars = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&chars) {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

/// Salted argon2id hash in PHC string form.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, credential: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(credential) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Opaque bearer tokens handed out at login. Sessions live in memory; a
/// restart logs everyone out.
#[derive(Default)]
pub struct Sessions {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl Sessions {
    pub fn issue(&self, user: UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), user);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }

    /// Drops every session of `user`; returns how many there were.
    pub fn revoke_user(&self, user: UserId) -> usize {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let before = tokens.len();
        tokens.retain(|_, owner| *owner != user);
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn salts_differ() {
        let first = hash_password("same-password").unwrap();
        let second = hash_password("same-password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn password_length_is_bounded() {
        assert_eq!(validate_password("short"), Err(AuthError::WeakPassword));
        assert_eq!(validate_password("longer"), Ok(()));
        assert_eq!(
            validate_password(&"x".repeat(MAX_PASSWORD_CHARS + 1)),
            Err(AuthError::WeakPassword)
        );
    }

    #[test]
    fn sessions_issue_resolve_and_revoke() {
        let sessions = Sessions::default();
        let a = sessions.issue(UserId(1));
        let b = sessions.issue(UserId(1));
        let c = sessions.issue(UserId(2));
        assert_ne!(a, b);
        assert_eq!(sessions.resolve(&c), Some(UserId(2)));
        assert!(sessions.revoke(&c));
        assert!(!sessions.revoke(&c));
        assert_eq!(sessions.resolve(&c), None);
        assert_eq!(sessions.revoke_user(UserId(1)), 2);
        assert!(sessions.is_empty());
    }
}
