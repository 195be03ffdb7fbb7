use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::error::ApiError;
use crate::identity::VerifiedIdentity;
use crate::models::{AppState, Role};
use crate::roles::{self, AdminProfile, Assignment, RoleError};
use crate::store::bounded;

/// Caller with a verified token and a resolved profile.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: String,
    pub email: String,
    pub role: Role,
    pub assignment: Assignment,
}

impl AuthContext {
    /// Profile id of a patient caller.
    pub fn patient_id(&self) -> Option<uuid::Uuid> {
        match &self.assignment {
            Assignment::Patient(p) => Some(p.patient_id),
            _ => None,
        }
    }

    pub fn doctor_id(&self) -> Option<uuid::Uuid> {
        match &self.assignment {
            Assignment::Doctor(d) | Assignment::Admin(AdminProfile::Stored(d)) => Some(d.doctor_id),
            _ => None,
        }
    }
}

/// Caller with a verified token, whatever its profile state.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub VerifiedIdentity);

async fn verify_bearer(parts: &mut Parts, state: &AppState) -> Result<VerifiedIdentity, ApiError> {
    let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
        TypedHeader::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::unauthenticated())?;

    let identity = bounded(state.store_timeout, async {
        state
            .identity
            .verify_token(authz.token())
            .await
            .map_err(RoleError::from)
    })
    .await?;
    Ok(identity)
}

impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move { Ok(VerifiedUser(verify_bearer(parts, state).await?)) }
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let identity = verify_bearer(parts, state).await?;

            let assignment = bounded(
                state.store_timeout,
                roles::resolve(state.store.as_ref(), state.identity.as_ref(), &identity),
            )
            .await?;

            let role = assignment.role().ok_or(RoleError::ProfileNotFound)?;

            Ok(AuthContext {
                uid: identity.uid,
                email: identity.email,
                role,
                assignment,
            })
        }
    }
}

pub fn ensure_doctor_or_admin(auth: &AuthContext) -> Result<(), ApiError> {
    match auth.role {
        Role::Doctor | Role::Admin => Ok(()),
        Role::Patient => Err(ApiError::forbidden("doctor or admin role required")),
    }
}

pub fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin role required"))
    }
}
