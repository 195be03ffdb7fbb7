// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{
        auth_context::AuthContext,
        extract::{ApiJson, ApiQuery},
    },
    models::{ApiOk, AppState, Appointment, AppointmentFilter, Role, parse_date},
    slots::{
        availability::{self, AllSlots, AllSlotsQuery, DaySlots, SlotsQuery},
        booking::{self, BookingRequest},
    },
    store::bounded,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_appointments))
        .route("/book", post(book_appointment))
        .route("/slots", get(get_slots).post(post_slots))
        .route("/all-slots", get(get_all_slots).post(post_all_slots))
}

fn required_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation("date is required"))?;
    parse_date(raw).ok_or_else(|| ApiError::validation("date must be YYYY-MM-DD"))
}

fn optional_uuid(field: &str, raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| ApiError::validation(format!("{field} must be a UUID"))),
    }
}

/* ==========================================================================
   Booking
   ========================================================================== */

#[derive(Debug, Serialize)]
pub struct BookedData {
    pub appointment_id: Uuid,
    pub appointment: Appointment,
}

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<BookingRequest>,
) -> Result<(StatusCode, Json<ApiOk<BookedData>>), ApiError> {
    let request = req.validate()?;

    if auth.role == Role::Patient && auth.patient_id() != Some(request.patient_id) {
        return Err(ApiError::forbidden("patients may only book for themselves"));
    }

    let appointment = booking::book(state.store.as_ref(), request, state.store_timeout).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: BookedData {
                appointment_id: appointment.appointment_id,
                appointment,
            },
        }),
    ))
}

/* ==========================================================================
   Listing
   ========================================================================== */

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentsQuery {
    #[serde(alias = "doctorID", alias = "doctorId")]
    pub doctor_id: Option<String>,
    #[serde(alias = "patientID", alias = "patientId")]
    pub patient_id: Option<String>,
    pub date: Option<String>,
}

/// Patients see their own appointments, doctors their own schedule, admins
/// everything (optionally filtered).
pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(q): ApiQuery<AppointmentsQuery>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let date = match q.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(required_date(Some(raw))?),
        None => None,
    };

    let filter = match (auth.role, auth.doctor_id(), auth.patient_id()) {
        (Role::Patient, _, Some(patient_id)) => AppointmentFilter {
            patient_id: Some(patient_id),
            date,
            ..Default::default()
        },
        (Role::Doctor, Some(doctor_id), _) => AppointmentFilter {
            doctor_id: Some(doctor_id),
            date,
            ..Default::default()
        },
        (Role::Admin, _, _) => AppointmentFilter {
            doctor_id: optional_uuid("doctor_id", q.doctor_id.as_deref())?,
            patient_id: optional_uuid("patient_id", q.patient_id.as_deref())?,
            date,
        },
        _ => return Err(ApiError::profile_not_found()),
    };

    let rows = bounded(state.store_timeout, state.store.list_appointments(filter)).await?;
    Ok(Json(ApiOk { data: rows }))
}

/* ==========================================================================
   Availability
   ========================================================================== */

async fn day_slots(state: &AppState, q: SlotsQuery) -> Result<Json<ApiOk<DaySlots>>, ApiError> {
    let doctor_id = optional_uuid("doctor_id", q.doctor_id.as_deref())?
        .ok_or_else(|| ApiError::validation("doctor_id is required"))?;
    let date = required_date(q.date.as_deref())?;

    let slots = bounded(
        state.store_timeout,
        availability::list_slots(state.store.as_ref(), doctor_id, date),
    )
    .await?;
    Ok(Json(ApiOk { data: slots }))
}

pub async fn get_slots(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SlotsQuery>,
) -> Result<Json<ApiOk<DaySlots>>, ApiError> {
    day_slots(&state, q).await
}

pub async fn post_slots(
    State(state): State<AppState>,
    ApiJson(q): ApiJson<SlotsQuery>,
) -> Result<Json<ApiOk<DaySlots>>, ApiError> {
    day_slots(&state, q).await
}

async fn all_slots(state: &AppState, q: AllSlotsQuery) -> Result<Json<ApiOk<AllSlots>>, ApiError> {
    let date = required_date(q.date.as_deref())?;
    let all = bounded(
        state.store_timeout,
        availability::list_all_slots(state.store.as_ref(), date),
    )
    .await?;
    Ok(Json(ApiOk { data: all }))
}

pub async fn get_all_slots(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<AllSlotsQuery>,
) -> Result<Json<ApiOk<AllSlots>>, ApiError> {
    all_slots(&state, q).await
}

pub async fn post_all_slots(
    State(state): State<AppState>,
    ApiJson(q): ApiJson<AllSlotsQuery>,
) -> Result<Json<ApiOk<AllSlots>>, ApiError> {
    all_slots(&state, q).await
}
