use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{self, ProfileDetails},
    auth::normalize_email,
    error::ApiError,
    middleware::{
        auth_context::{AuthContext, VerifiedUser, ensure_admin},
        extract::ApiJson,
    },
    models::{ApiOk, AppState, DoctorProfile, PatientProfile, Role},
    roles::{self, Assignment},
    store::bounded,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assign-role", post(assign_role))
        .route("/doctors", post(provision_doctor))
        .route("/my-role", get(my_role))
        .route("/users", get(list_users))
}

#[derive(Debug, Serialize)]
pub struct RoleData {
    pub uid: String,
    pub email: String,
    #[serde(flatten)]
    pub assignment: Assignment,
}

/* ==========================================================================
   Role assignment
   ========================================================================== */

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    #[serde(default)]
    pub email: String,
    pub role: Option<String>,
    #[serde(default, alias = "additionalData")]
    pub additional_data: ProfileDetails,
}

/// Binds a doctor or admin profile to an identity that exists but has no
/// profile yet.
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> Result<(StatusCode, Json<ApiOk<RoleData>>), ApiError> {
    ensure_admin(&auth)?;

    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(ApiError::validation("email and role are required"));
    }
    let role = match req.role.as_deref().map(Role::parse) {
        None => return Err(ApiError::validation("email and role are required")),
        Some(Some(r @ (Role::Doctor | Role::Admin))) => r,
        Some(_) => return Err(ApiError::validation("role must be either doctor or admin")),
    };

    let user = bounded(state.store_timeout, state.identity.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::NotFound("USER_NOT_FOUND", "no identity exists for this email".into()))?;

    let identity = crate::identity::VerifiedIdentity {
        uid: user.uid.clone(),
        email: user.email.clone(),
    };
    let existing = bounded(
        state.store_timeout,
        roles::resolve(state.store.as_ref(), state.identity.as_ref(), &identity),
    )
    .await?;
    if let Some(current) = existing.role() {
        return Err(ApiError::Conflict(
            "ROLE_EXISTS",
            format!("user already has role {current}"),
        ));
    }

    let assignment = accounts::create_profile(&state, &user.uid, &user.email, role, req.additional_data).await?;
    tracing::info!(uid = %user.uid, role = %role, by = %auth.uid, "role assigned");

    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: RoleData {
                uid: user.uid,
                email: user.email,
                assignment,
            },
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ProvisionDoctorRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

/// Creates identity and doctor profile in one step. The new doctor signs in
/// with the given password; no token is handed to the admin.
pub async fn provision_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ProvisionDoctorRequest>,
) -> Result<(StatusCode, Json<ApiOk<RoleData>>), ApiError> {
    ensure_admin(&auth)?;

    let has_name = req.details.name.as_deref().is_some_and(|n| !n.trim().is_empty());
    if req.email.trim().is_empty() || req.password.is_empty() || !has_name {
        return Err(ApiError::validation("email, password and name are required"));
    }

    let session = accounts::sign_up(&state, &req.email, &req.password, Role::Doctor, req.details).await?;
    tracing::info!(uid = %session.user_id, by = %auth.uid, "doctor provisioned");

    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: RoleData {
                uid: session.user_id,
                email: session.email,
                assignment: session.assignment,
            },
        }),
    ))
}

/* ==========================================================================
   Lookups
   ========================================================================== */

pub async fn my_role(
    State(state): State<AppState>,
    VerifiedUser(identity): VerifiedUser,
) -> Result<Json<ApiOk<RoleData>>, ApiError> {
    let assignment = bounded(
        state.store_timeout,
        roles::resolve(state.store.as_ref(), state.identity.as_ref(), &identity),
    )
    .await?;

    if assignment.role().is_none() {
        return Err(ApiError::NotFound(
            "NO_ROLE",
            "identity exists but has no role assigned; use /api/admin/assign-role".into(),
        ));
    }

    Ok(Json(ApiOk {
        data: RoleData {
            uid: identity.uid,
            email: identity.email,
            assignment,
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub count: usize,
    pub users: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(users: Vec<T>) -> Self {
        Listing {
            count: users.len(),
            users,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersData {
    pub doctors: Listing<DoctorProfile>,
    pub patients: Listing<PatientProfile>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<UsersData>>, ApiError> {
    ensure_admin(&auth)?;
    let doctors = bounded(state.store_timeout, state.store.list_doctors()).await?;
    let patients = bounded(state.store_timeout, state.store.list_patients()).await?;
    Ok(Json(ApiOk {
        data: UsersData {
            doctors: doctors.into(),
            patients: patients.into(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, send, signup, state};

    #[tokio::test]
    async fn admin_assigns_role_to_bare_identity() {
        let state = state();
        let app = app(&state);
        let (admin, _) = signup(&app, "admin", "root@clinic.org").await;
        let bare = state.identity.create_user("new@clinic.org", "secret-1", None).await.unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/admin/assign-role",
            Some(&admin),
            Some(json!({
                "email": "new@clinic.org",
                "role": "doctor",
                "additionalData": { "specialty": "Cardiology" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["data"]["role"], "doctor");
        assert_eq!(body["data"]["profile"]["specialty"], "Cardiology");

        let (status, body) = send(&app, "GET", "/api/admin/my-role", Some(&bare.id_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "doctor");
    }

    #[tokio::test]
    async fn assign_role_conflicts_and_missing_identity() {
        let state = state();
        let app = app(&state);
        let (admin, _) = signup(&app, "admin", "root@clinic.org").await;
        signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/admin/assign-role",
            Some(&admin),
            Some(json!({ "email": "pat@clinic.org", "role": "doctor" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ROLE_EXISTS");

        let (status, _) = send(
            &app,
            "POST",
            "/api/admin/assign-role",
            Some(&admin),
            Some(json!({ "email": "ghost@clinic.org", "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/api/admin/assign-role",
            Some(&admin),
            Some(json!({ "email": "pat@clinic.org", "role": "patient" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_admin_cannot_assign_roles() {
        let state = state();
        let app = app(&state);
        let (doc, _) = signup(&app, "doctor", "doc@clinic.org").await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/admin/assign-role",
            Some(&doc),
            Some(json!({ "email": "doc@clinic.org", "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn my_role_is_not_found_for_bare_identity() {
        let state = state();
        let app = app(&state);
        let bare = state.identity.create_user("new@clinic.org", "secret-1", None).await.unwrap();

        let (status, body) = send(&app, "GET", "/api/admin/my-role", Some(&bare.id_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NO_ROLE");

        let (status, _) = send(&app, "GET", "/api/admin/my-role", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn provision_doctor_and_list_users() {
        let state = state();
        let app = app(&state);
        let (admin, _) = signup(&app, "admin", "root@clinic.org").await;
        signup(&app, "patient", "pat@clinic.org").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/admin/doctors",
            Some(&admin),
            Some(json!({
                "email": "new.doc@clinic.org",
                "password": "secret-1",
                "name": "Dr. New",
                "specialty": "Dermatology",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert!(body["data"].get("token").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "new.doc@clinic.org", "password": "secret-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "doctor");

        let (status, body) = send(&app, "GET", "/api/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["doctors"]["count"], 2);
        assert_eq!(body["data"]["patients"]["count"], 1);
    }
}
