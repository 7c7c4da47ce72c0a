use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

use super::dto::RegisterRequest;
use crate::storage::NewUser;

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Argon2 PHC string for a plaintext credential.
pub fn hash_credential(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hash failed");
            anyhow::anyhow!("hash credential: {e}")
        })
}

pub fn verify_credential(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored credential is not a PHC string");
        anyhow::anyhow!("parse stored credential: {e}")
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Normalizes and checks a registration, returning it with the plaintext
/// password still in place. Hashing is left to the caller.
pub fn validate_registration(req: RegisterRequest) -> Result<NewUser, String> {
    let username = req.username.trim().to_string();
    if !is_valid_username(&username) {
        return Err("username must be 3-32 letters, digits, '_', '.' or '-'".into());
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err("Password too short".into());
    }
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err("Invalid email".into());
        }
    }
    let full_name = req
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    Ok(NewUser {
        username,
        password: req.password,
        email,
        full_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, password: &str, email: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: password.into(),
            email: email.map(Into::into),
            full_name: Some(" Ana Trader ".into()),
        }
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_credential("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_credential("Secur3P@ssw0rd!", &hash).unwrap());
        assert!(!verify_credential("wrong-password", &hash).unwrap());
    }

    #[test]
    fn verify_errors_on_plaintext_storage() {
        assert!(verify_credential("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn registration_is_normalized() {
        let user = validate_registration(registration(
            " trader_01 ",
            "long-enough",
            Some(" Ana@Example.COM "),
        ))
        .unwrap();
        assert_eq!(user.username, "trader_01");
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(user.full_name.as_deref(), Some("Ana Trader"));
    }

    #[test]
    fn registration_rejects_bad_input() {
        assert!(validate_registration(registration("ab", "long-enough", None)).is_err());
        assert!(validate_registration(registration("has space", "long-enough", None)).is_err());
        assert!(validate_registration(registration("trader", "short", None)).is_err());
        assert!(validate_registration(registration("trader", "long-enough", Some("nope"))).is_err());
        assert!(validate_registration(registration("trader", "long-enough", Some("  "))).is_ok());
    }
}
