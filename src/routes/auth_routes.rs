use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;

use crate::{
    accounts::SessionResponse,
    error::ApiError,
    identity::VerifiedIdentity,
    middleware::extract::ApiJson,
    models::{ApiOk, AppState},
    roles::{self, RoleError},
    store::bounded,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<ApiOk<SessionResponse>>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let signed = bounded(state.store_timeout, state.identity.sign_in(email, &req.password)).await?;

    let identity = VerifiedIdentity {
        uid: signed.uid.clone(),
        email: signed.email.clone(),
    };
    let assignment = bounded(
        state.store_timeout,
        roles::resolve_for_login(state.store.as_ref(), state.identity.as_ref(), &identity),
    )
    .await?;

    if assignment.role().is_none() {
        tracing::warn!(uid = %identity.uid, "login for identity without profile");
        return Err(RoleError::ProfileNotFound.into());
    }

    tracing::info!(uid = %identity.uid, role = ?assignment.role(), "login");
    Ok(Json(ApiOk {
        data: SessionResponse::new(signed, assignment),
    }))
}
