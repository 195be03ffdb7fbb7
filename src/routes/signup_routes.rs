use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;

use crate::{
    accounts::{self, ProfileDetails, SessionResponse},
    error::ApiError,
    middleware::extract::ApiJson,
    models::{ApiOk, AppState, Role},
};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(signup))
        .route("/doctor", post(signup_doctor))
        .route("/admin", post(signup_admin))
        .route("/patient", post(signup_patient))
}

type Created = (StatusCode, Json<ApiOk<SessionResponse>>);

async fn run_signup(state: &AppState, req: SignupRequest, role: Role) -> Result<Created, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }
    let session = accounts::sign_up(state, &req.email, &req.password, role, req.details).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: session })))
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<Created, ApiError> {
    let role = req
        .role
        .as_deref()
        .and_then(Role::parse)
        .ok_or_else(|| ApiError::validation("role must be doctor, admin or patient"))?;
    run_signup(&state, req, role).await
}

pub async fn signup_doctor(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<Created, ApiError> {
    run_signup(&state, req, Role::Doctor).await
}

pub async fn signup_admin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<Created, ApiError> {
    run_signup(&state, req, Role::Admin).await
}

pub async fn signup_patient(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<Created, ApiError> {
    run_signup(&state, req, Role::Patient).await
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, send, stalled_identity_state, state};

    #[tokio::test]
    async fn generic_signup_requires_a_valid_role() {
        let app = app(&state());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup",
            None,
            Some(json!({ "email": "a@clinic.org", "password": "secret-1", "role": "nurse" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn generic_signup_with_role_and_details() {
        let app = app(&state());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup",
            None,
            Some(json!({
                "email": "doc@clinic.org",
                "password": "secret-1",
                "role": "doctor",
                "name": "Dr. Grey",
                "workingDays": ["Monday", "Tuesday"],
                "defaultSlots": [{ "from": "09:00", "to": "09:30" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["data"]["role"], "doctor");
        assert_eq!(body["data"]["profile"]["name"], "Dr. Grey");
        assert_eq!(body["data"]["profile"]["working_days"], json!(["monday", "tuesday"]));
        assert_eq!(body["data"]["profile"]["default_slots"][0]["start"], "09:00");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let app = app(&state());
        let req = json!({ "email": "pat@clinic.org", "password": "secret-1" });
        let (status, _) = send(&app, "POST", "/api/signup/patient", None, Some(req.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "POST", "/api/signup/patient", None, Some(req)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "EMAIL_EXISTS");
    }

    #[tokio::test]
    async fn weak_password_and_bad_email_are_rejected() {
        let app = app(&state());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup/patient",
            None,
            Some(json!({ "email": "pat@clinic.org", "password": "12345" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "WEAK_PASSWORD");

        let (status, body) = send(
            &app,
            "POST",
            "/api/signup/patient",
            None,
            Some(json!({ "email": "not-an-email", "password": "secret-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_EMAIL");
    }

    #[tokio::test]
    async fn admin_signup_gets_default_permissions() {
        let app = app(&state());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup/admin",
            None,
            Some(json!({ "email": "root@clinic.org", "password": "secret-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["role"], "admin");
        assert_eq!(body["data"]["profile"]["permissions"], json!(["read", "write", "delete"]));
        assert_eq!(body["data"]["profile"]["name"], "Admin root");
    }

    #[tokio::test]
    async fn stalled_identity_backend_times_out() {
        let app = app(&stalled_identity_state());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signup/patient",
            None,
            Some(json!({ "email": "pat@clinic.org", "password": "secret-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL");
    }
}
