// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{State},
    http::StatusCode,
    routing::{get, post},
};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    accounts::ProfileDetails,
    auth::{is_valid_email, normalize_email},
    error::ApiError,
    middleware::{
        auth_context::{AuthContext, ensure_doctor_or_admin},
        extract::{ApiJson, ApiPath},
    },
    models::{
        ApiOk, AppState, HistoryRecord, MessageData, NewHistoryRecord, PatientChanges,
        PatientProfile, parse_date,
    },
    store::{StoreError, bounded},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_patients).post(create_patient))
        .route(
            "/{patient_id}",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/{patient_id}/full", get(get_patient_full))
        .route("/{patient_id}/history", post(add_history))
        .route("/username/{username}", get(get_patients_by_username))
}

fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Only called when the field is present: null => Some(None).
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}

fn patient_not_found() -> ApiError {
    ApiError::NotFound("NOT_FOUND", "patient not found".into())
}

fn email_conflict(e: StoreError) -> ApiError {
    match e {
        StoreError::Duplicate(_) => ApiError::Conflict(
            "EMAIL_EXISTS",
            "Patient with this email already exists".into(),
        ),
        other => other.into(),
    }
}

async fn load_patient(state: &AppState, patient_id: Uuid) -> Result<PatientProfile, ApiError> {
    bounded(state.store_timeout, state.store.get_patient(patient_id))
        .await?
        .ok_or_else(patient_not_found)
}

/* ==========================================================================
   Read
   ========================================================================== */

pub async fn list_patients(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<PatientProfile>>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;
    let rows = bounded(state.store_timeout, state.store.list_patients()).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<PatientProfile>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;
    let patient = load_patient(&state, patient_id).await?;
    Ok(Json(ApiOk { data: patient }))
}

#[derive(Debug, Serialize)]
pub struct PatientWithHistory {
    pub patient: PatientProfile,
    pub history: Vec<HistoryRecord>,
}

pub async fn get_patient_full(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<PatientWithHistory>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;
    let patient = load_patient(&state, patient_id).await?;
    let history = bounded(state.store_timeout, state.store.list_history(patient_id)).await?;
    Ok(Json(ApiOk {
        data: PatientWithHistory { patient, history },
    }))
}

pub async fn get_patients_by_username(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<ApiOk<Vec<PatientProfile>>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;
    let rows = bounded(
        state.store_timeout,
        state.store.find_patients_by_username(username.trim()),
    )
    .await?;
    if rows.is_empty() {
        return Err(patient_not_found());
    }
    Ok(Json(ApiOk { data: rows }))
}

/* ==========================================================================
   Write
   ========================================================================== */

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    #[serde(default)]
    pub email: String,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePatientRequest>,
) -> Result<(StatusCode, Json<ApiOk<PatientProfile>>), ApiError> {
    ensure_doctor_or_admin(&auth)?;

    let email = normalize_email(&req.email);
    let has_name = req.details.name.as_deref().is_some_and(|n| !n.trim().is_empty());
    if email.is_empty() || !has_name {
        return Err(ApiError::validation("name and email are required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email is not valid"));
    }

    let mut new = req.details.into_patient(None, &email)?;
    new.created_by = Some(auth.uid.clone());
    new.created_by_role = Some(auth.role);

    let patient = bounded(state.store_timeout, state.store.insert_patient(new))
        .await
        .map_err(email_conflict)?;

    tracing::info!(
        patient_id = %patient.patient_id,
        by = %auth.uid,
        role = %auth.role,
        "patient created"
    );
    Ok((StatusCode::CREATED, Json(ApiOk { data: patient })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub username: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, alias = "dateOfBirth", deserialize_with = "deserialize_double_option")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address: Option<Option<String>>,
}

fn clearable(v: Option<Option<String>>) -> Option<Option<String>> {
    v.map(|inner| inner.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

pub async fn update_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(patient_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientProfile>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;

    let email = match req.email.as_deref().map(normalize_email) {
        Some(e) if e.is_empty() => None,
        Some(e) if !is_valid_email(&e) => return Err(ApiError::validation("email is not valid")),
        other => other,
    };

    let date_of_birth = match clearable(req.date_of_birth) {
        None => None,
        Some(None) => Some(None),
        Some(Some(raw)) => Some(Some(
            parse_date(&raw).ok_or_else(|| ApiError::validation("date_of_birth must be YYYY-MM-DD"))?,
        )),
    };

    let changes = PatientChanges {
        name: req.name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        email,
        username: clearable(req.username),
        phone: clearable(req.phone),
        date_of_birth,
        address: clearable(req.address),
        updated_by: auth.uid.clone(),
        updated_by_role: auth.role,
    };

    let updated = bounded(state.store_timeout, state.store.update_patient(patient_id, changes))
        .await
        .map_err(email_conflict)?
        .ok_or_else(patient_not_found)?;

    tracing::info!(%patient_id, by = %auth.uid, role = %auth.role, "patient updated");
    Ok(Json(ApiOk { data: updated }))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<MessageData>>, ApiError> {
    ensure_doctor_or_admin(&auth)?;

    let removed = bounded(state.store_timeout, state.store.delete_patient(patient_id)).await?;
    if !removed {
        return Err(patient_not_found());
    }

    tracing::info!(%patient_id, by = %auth.uid, role = %auth.role, "patient deleted");
    Ok(Json(ApiOk {
        data: MessageData {
            message: format!("patient {patient_id} deleted"),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddHistoryRequest {
    #[serde(alias = "diag")]
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub cost: Option<f64>,
    pub payment_method: Option<String>,
    pub doctor_name: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Largest accepted history cost, in cents.
pub const MAX_COST_CENTS: i64 = 1_000_000_000;

/// Rounds a currency amount to whole cents. `None` unless the result is
/// between one cent and [`MAX_COST_CENTS`].
fn cost_to_cents(cost: f64) -> Option<i64> {
    let cents = (cost * 100.0).round();
    if !cents.is_finite() || cents < 1.0 || cents > MAX_COST_CENTS as f64 {
        return None;
    }
    Some(cents as i64)
}

fn required_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub async fn add_history(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(patient_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddHistoryRequest>,
) -> Result<(StatusCode, Json<ApiOk<HistoryRecord>>), ApiError> {
    ensure_doctor_or_admin(&auth)?;

    let (Some(diagnosis), Some(treatment), Some(cost), Some(payment_method), Some(doctor_name)) = (
        required_text(req.diagnosis),
        required_text(req.treatment),
        req.cost,
        required_text(req.payment_method),
        required_text(req.doctor_name),
    ) else {
        return Err(ApiError::validation(
            "diagnosis, treatment, cost, payment_method and doctor_name are required",
        ));
    };
    let Some(cost_cents) = cost_to_cents(cost) else {
        return Err(ApiError::validation("cost must be at least 0.01 and at most 10000000"));
    };

    load_patient(&state, patient_id).await?;

    let record = bounded(
        state.store_timeout,
        state.store.insert_history(NewHistoryRecord {
            patient_id,
            diagnosis,
            treatment,
            cost_cents,
            payment_method,
            doctor_name,
            notes: req.notes.unwrap_or_default(),
            attachments: req.attachments,
            created_by: auth.uid.clone(),
        }),
    )
    .await?;

    tracing::info!(%patient_id, record_id = %record.record_id, by = %auth.uid, "history record added");
    Ok((StatusCode::CREATED, Json(ApiOk { data: record })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, send, signup, state};

    #[tokio::test]
    async fn patients_cannot_use_patient_admin_routes() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(&app, "GET", "/api/patients", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn doctor_creates_updates_and_deletes_patient() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/patients",
            Some(&token),
            Some(json!({ "name": "Ann", "email": "ann@clinic.org", "username": "ann1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["data"]["created_by_role"], "doctor");
        let id = body["data"]["patient_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/api/patients",
            Some(&token),
            Some(json!({ "name": "Ann again", "email": "ANN@clinic.org" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/patients/{id}"),
            Some(&token),
            Some(json!({ "phone": "555-0100", "username": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["phone"], "555-0100");
        assert_eq!(body["data"]["username"], serde_json::Value::Null);
        assert_eq!(body["data"]["name"], "Ann");

        let (status, _) = send(&app, "DELETE", &format!("/api/patients/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "GET", &format!("/api/patients/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn update_rejects_email_owned_by_another_patient() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "admin", "root@clinic.org").await;
        let (_, first) = signup(&app, "patient", "one@clinic.org").await;
        signup(&app, "patient", "two@clinic.org").await;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/patients/{first}"),
            Some(&token),
            Some(json!({ "email": "two@clinic.org" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "EMAIL_EXISTS");
    }

    #[tokio::test]
    async fn history_is_appended_and_returned_with_full_profile() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;
        let (_, patient_id) = signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/patients/{patient_id}/history"),
            Some(&token),
            Some(json!({
                "diag": "flu",
                "treatment": "rest",
                "cost": 25.5,
                "payment_method": "cash",
                "doctor_name": "Dr. doc",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["data"]["cost_cents"], 2550);

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/patients/{patient_id}/full"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["history"][0]["diagnosis"], "flu");
        assert_eq!(body["data"]["patient"]["medical_history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_needs_required_fields() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;
        let (_, patient_id) = signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/patients/{patient_id}/history"),
            Some(&token),
            Some(json!({ "diag": "flu" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn lookup_by_username() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;
        send(
            &app,
            "POST",
            "/api/patients",
            Some(&token),
            Some(json!({ "name": "Ann", "email": "ann@clinic.org", "username": "ann1" })),
        )
        .await;

        let (status, body) =
            send(&app, "GET", "/api/patients/username/ann1", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["email"], "ann@clinic.org");

        let (status, _) =
            send(&app, "GET", "/api/patients/username/nobody", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_patient_id_is_a_validation_error() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;

        let (status, body) = send(&app, "GET", "/api/patients/not-a-uuid", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[test]
    fn cost_is_rounded_to_cents_within_bounds() {
        assert_eq!(super::cost_to_cents(12.34), Some(1234));
        assert_eq!(super::cost_to_cents(0.01), Some(1));
        assert_eq!(super::cost_to_cents(0.001), None);
        assert_eq!(super::cost_to_cents(-5.0), None);
        assert_eq!(super::cost_to_cents(1e300), None);
        assert_eq!(super::cost_to_cents(f64::NAN), None);
    }

    #[tokio::test]
    async fn sub_cent_cost_is_rejected() {
        let state = state();
        let app = app(&state);
        let (token, _) = signup(&app, "doctor", "doc@clinic.org").await;
        let (_, patient_id) = signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/patients/{patient_id}/history"),
            Some(&token),
            Some(json!({
                "diagnosis": "flu",
                "treatment": "rest",
                "cost": 0.001,
                "payment_method": "cash",
                "doctor_name": "Dr. Doc",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
