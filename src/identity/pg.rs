// src/identity/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    IdentityError, IdentityProvider, IdentityRecord, SignedIn, VerifiedIdentity,
    validate_new_credentials,
};
use crate::auth::{
    generate_access_token, generate_uid, hash_access_token, hash_password, normalize_email,
    verify_password,
};
use crate::models::Role;

/// Identities and bearer sessions kept in Postgres.
pub struct PgIdentity {
    pool: PgPool,
    session_ttl_hours: i64,
}

impl PgIdentity {
    pub fn new(pool: PgPool, session_ttl_hours: i64) -> Self {
        Self {
            pool,
            session_ttl_hours,
        }
    }

    async fn open_session(&self, uid: &str, email: &str) -> Result<SignedIn, IdentityError> {
        let access_token = generate_access_token();
        let token_hash = hash_access_token(&access_token);
        let expires_at = Utc::now() + Duration::hours(self.session_ttl_hours);

        sqlx::query(
            r#"
            INSERT INTO identity_session (session_id, uid, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(uid)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(SignedIn {
            uid: uid.to_string(),
            email: email.to_string(),
            id_token: access_token,
            expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    uid: String,
    email: String,
    display_name: Option<String>,
    password_hash: String,
    role_claim: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<IdentityRow> for IdentityRecord {
    fn from(r: IdentityRow) -> Self {
        IdentityRecord {
            uid: r.uid,
            email: r.email,
            display_name: r.display_name,
            role_claim: r.role_claim.as_deref().and_then(Role::parse),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    uid: String,
    email: String,
}

#[async_trait]
impl IdentityProvider for PgIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError> {
        let email = normalize_email(email);
        let user: IdentityRow = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT uid, email, display_name, password_hash, role_claim, created_at
            FROM identity_user
            WHERE email = $1
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }

        self.open_session(&user.uid, &user.email).await
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

        let inserted = sqlx::query(
            r#"
            INSERT INTO identity_user (uid, email, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(&uid)
        .bind(&email)
        .bind(display_name)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(IdentityError::EmailExists);
        }

        self.open_session(&uid, &email).await
    }

    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError> {
        let res = sqlx::query("DELETE FROM identity_user WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let token_hash = hash_access_token(token);

        let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            SELECT u.uid, u.email
            FROM identity_session s
            JOIN identity_user u ON u.uid = s.uid
            WHERE s.token_hash = $1
              AND s.expires_at > now()
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(IdentityError::InvalidToken)?;

        Ok(VerifiedIdentity {
            uid: row.uid,
            email: row.email,
        })
    }

    async fn get_user(&self, uid: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        let row: Option<IdentityRow> = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT uid, email, display_name, password_hash, role_claim, created_at
            FROM identity_user
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IdentityRecord::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        let row: Option<IdentityRow> = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT uid, email, display_name, password_hash, role_claim, created_at
            FROM identity_user
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IdentityRecord::from))
    }

    async fn set_role_claim(&self, uid: &str, role: Option<Role>) -> Result<(), IdentityError> {
        let res = sqlx::query("UPDATE identity_user SET role_claim = $2 WHERE uid = $1")
            .bind(uid)
            .bind(role.map(Role::as_str))
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }
}
