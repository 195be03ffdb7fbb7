// src/identity/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{
    IdentityError, IdentityProvider, IdentityRecord, SignedIn, VerifiedIdentity,
    validate_new_credentials,
};
use crate::auth::{
    generate_access_token, generate_uid, hash_access_token, hash_password, normalize_email,
    verify_password,
};
use crate::models::Role;

pub struct MemoryIdentity {
    session_ttl_hours: i64,
    inner: Mutex<Accounts>,
}

#[derive(Default)]
struct Accounts {
    users: Vec<StoredUser>,
    // token hash -> (uid, expires_at)
    sessions: HashMap<String, (String, DateTime<Utc>)>,
}

#[derive(Clone)]
struct StoredUser {
    record: IdentityRecord,
    password_hash: String,
}

impl MemoryIdentity {
    pub fn new(session_ttl_hours: i64) -> Self {
        Self {
            session_ttl_hours,
            inner: Mutex::new(Accounts::default()),
        }
    }

    async fn open_session(&self, uid: &str, email: &str) -> SignedIn {
        let access_token = generate_access_token();
        let expires_at = Utc::now() + Duration::hours(self.session_ttl_hours);
        self.inner
            .lock()
            .await
            .sessions
            .insert(hash_access_token(&access_token), (uid.to_string(), expires_at));
        SignedIn {
            uid: uid.to_string(),
            email: email.to_string(),
            id_token: access_token,
            expires_at,
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError> {
        let email = normalize_email(email);
        let user = {
            let accounts = self.inner.lock().await;
            accounts
                .users
                .iter()
                .find(|u| u.record.email == email)
                .cloned()
                .ok_or(IdentityError::InvalidCredentials)?
        };

        if !verify_password(password, &user.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }

        Ok(self.open_session(&user.record.uid, &user.record.email).await)
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignedIn, IdentityError> {
        let email = validate_new_credentials(email, password)?;
        let password_hash = hash_password(password).map_err(IdentityError::Hashing)?;
        let uid = generate_uid();

        {
            let mut accounts = self.inner.lock().await;
            if accounts.users.iter().any(|u| u.record.email == email) {
                return Err(IdentityError::EmailExists);
            }
            accounts.users.push(StoredUser {
                record: IdentityRecord {
                    uid: uid.clone(),
                    email: email.clone(),
                    display_name: display_name.map(str::to_string),
                    role_claim: None,
                    created_at: Utc::now(),
                },
                password_hash,
            });
        }

        Ok(self.open_session(&uid, &email).await)
    }

    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError> {
        let mut accounts = self.inner.lock().await;
        let before = accounts.users.len();
        accounts.users.retain(|u| u.record.uid != uid);
        if accounts.users.len() == before {
            return Err(IdentityError::UserNotFound);
        }
        accounts.sessions.retain(|_, (owner, _)| owner.as_str() != uid);
        Ok(())
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let accounts = self.inner.lock().await;
        let (uid, expires_at) = accounts
            .sessions
            .get(&hash_access_token(token))
            .ok_or(IdentityError::InvalidToken)?;
        if *expires_at <= Utc::now() {
            return Err(IdentityError::InvalidToken);
        }
        let user = accounts
            .users
            .iter()
            .find(|u| &u.record.uid == uid)
            .ok_or(IdentityError::InvalidToken)?;
        Ok(VerifiedIdentity {
            uid: user.record.uid.clone(),
            email: user.record.email.clone(),
        })
    }

    async fn get_user(&self, uid: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        let accounts = self.inner.lock().await;
        Ok(accounts
            .users
            .iter()
            .find(|u| u.record.uid == uid)
            .map(|u| u.record.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        let email = normalize_email(email);
        let accounts = self.inner.lock().await;
        Ok(accounts
            .users
            .iter()
            .find(|u| u.record.email == email)
            .map(|u| u.record.clone()))
    }

    async fn set_role_claim(&self, uid: &str, role: Option<Role>) -> Result<(), IdentityError> {
        let mut accounts = self.inner.lock().await;
        let user = accounts
            .users
            .iter_mut()
            .find(|u| u.record.uid == uid)
            .ok_or(IdentityError::UserNotFound)?;
        user.record.role_claim = role;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_verify_and_sign_in() {
        let idp = MemoryIdentity::new(1);
        let created = idp.create_user("Doc@Clinic.org", "secret-1", None).await.unwrap();

        let verified = idp.verify_token(&created.id_token).await.unwrap();
        assert_eq!(verified.uid, created.uid);
        assert_eq!(verified.email, "doc@clinic.org");

        let again = idp.sign_in("doc@clinic.org", "secret-1").await.unwrap();
        assert_eq!(again.uid, created.uid);
        assert!(matches!(
            idp.sign_in("doc@clinic.org", "wrong-pass").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let idp = MemoryIdentity::new(1);
        idp.create_user("a@clinic.org", "secret-1", None).await.unwrap();
        assert!(matches!(
            idp.create_user("A@clinic.org", "secret-2", None).await,
            Err(IdentityError::EmailExists)
        ));
    }

    #[tokio::test]
    async fn expired_and_unknown_tokens_fail() {
        let idp = MemoryIdentity::new(0);
        let created = idp.create_user("a@clinic.org", "secret-1", None).await.unwrap();
        assert!(matches!(
            idp.verify_token(&created.id_token).await,
            Err(IdentityError::InvalidToken)
        ));
        assert!(matches!(
            idp.verify_token("garbage").await,
            Err(IdentityError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn deleting_a_user_revokes_its_tokens() {
        let idp = MemoryIdentity::new(1);
        let created = idp.create_user("a@clinic.org", "secret-1", None).await.unwrap();
        idp.delete_user(&created.uid).await.unwrap();
        assert!(idp.verify_token(&created.id_token).await.is_err());
        assert!(idp.get_user(&created.uid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_claim_is_stored() {
        let idp = MemoryIdentity::new(1);
        let created = idp.create_user("a@clinic.org", "secret-1", None).await.unwrap();
        idp.set_role_claim(&created.uid, Some(Role::Admin)).await.unwrap();
        let rec = idp.get_user_by_email("a@clinic.org").await.unwrap().unwrap();
        assert_eq!(rec.role_claim, Some(Role::Admin));
    }
}
