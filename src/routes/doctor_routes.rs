use axum::{
    Json, Router,
    extract::State,
    routing::{get, put},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{
        auth_context::{AuthContext, ensure_admin, ensure_doctor_or_admin},
        extract::{ApiJson, ApiPath},
    },
    models::{ApiOk, AppState, DoctorProfile, SlotTemplate, normalize_working_days},
    store::bounded,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{doctor_id}", get(get_doctor))
        .route("/{doctor_id}/schedule", put(update_schedule))
}

fn doctor_not_found() -> ApiError {
    ApiError::NotFound("NOT_FOUND", "doctor not found".into())
}

pub async fn get_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<DoctorProfile>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;
    let doctor = bounded(state.store_timeout, state.store.get_doctor(doctor_id))
        .await?
        .ok_or_else(doctor_not_found)?;
    Ok(Json(ApiOk { data: doctor }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(alias = "workingDays")]
    pub working_days: Option<Vec<String>>,
    #[serde(alias = "defaultSlots")]
    pub default_slots: Option<Vec<SlotTemplate>>,
}

/// Replaces working days and/or slot templates. Already generated slots are
/// left alone; the next generation run picks up the new schedule.
pub async fn update_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(doctor_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> Result<Json<ApiOk<DoctorProfile>>, ApiError> {
    ensure_admin(&auth)?;

    let current = bounded(state.store_timeout, state.store.get_doctor(doctor_id))
        .await?
        .ok_or_else(doctor_not_found)?;

    let working_days = match req.working_days {
        Some(days) => normalize_working_days(&days).map_err(ApiError::validation)?,
        None => current.working_days,
    };
    let mut default_slots = req.default_slots.unwrap_or(current.default_slots);
    if default_slots.iter().any(|t| t.end <= t.start) {
        return Err(ApiError::validation("slot end must be after start"));
    }
    default_slots.sort_by_key(|t| (t.start, t.end));
    default_slots.dedup();

    let updated = bounded(
        state.store_timeout,
        state.store.update_doctor_schedule(doctor_id, working_days, default_slots),
    )
    .await?
    .ok_or_else(doctor_not_found)?;

    tracing::info!(%doctor_id, by = %auth.uid, "doctor schedule updated");
    Ok(Json(ApiOk { data: updated }))
}
