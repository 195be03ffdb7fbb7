//! Identity provider contract: sign-in, token verification, user creation
//! and deletion, and the legacy role claim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{MIN_PASSWORD_LEN, is_valid_email, normalize_email};
use crate::models::Role;
use crate::store::StoreError;

pub mod memory;
pub mod pg;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("EMAIL_EXISTS")]
    EmailExists,
    #[error("WEAK_PASSWORD")]
    WeakPassword,
    #[error("INVALID_EMAIL")]
    InvalidEmail,
    #[error("user not found")]
    UserNotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("identity backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Claims extracted from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityRecord {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role_claim: Option<Role>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub uid: String,
    pub email: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError>;
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignedIn, IdentityError>;
    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError>;
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
    async fn get_user(&self, uid: &str) -> Result<Option<IdentityRecord>, IdentityError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, IdentityError>;
    async fn set_role_claim(&self, uid: &str, role: Option<Role>) -> Result<(), IdentityError>;
}

/// Checks shared by every backend before an identity is created.
/// Returns the normalized email.
pub fn validate_new_credentials(email: &str, password: &str) -> Result<String, IdentityError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(IdentityError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword);
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_credentials_are_checked() {
        assert_eq!(
            validate_new_credentials(" Pat@Clinic.org ", "secret").unwrap(),
            "pat@clinic.org"
        );
        assert!(matches!(
            validate_new_credentials("pat@clinic.org", "12345"),
            Err(IdentityError::WeakPassword)
        ));
        assert!(matches!(
            validate_new_credentials("pat", "secret"),
            Err(IdentityError::InvalidEmail)
        ));
    }
}
