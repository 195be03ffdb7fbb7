use crate::models::AppState;
use axum::Router;

pub mod admin_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod doctor_routes;
pub mod health_routes;
pub mod patient_routes;
pub mod signup_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api/signup", signup_routes::router())
        .nest("/api/appointments", appointment_routes::router())
        .nest("/api/patients", patient_routes::router())
        .nest("/api/doctors", doctor_routes::router())
        .nest("/api/admin", admin_routes::router())
        .merge(health_routes::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::identity::memory::MemoryIdentity;
    use crate::identity::{IdentityError, IdentityProvider, IdentityRecord, SignedIn, VerifiedIdentity};
    use crate::models::{AppState, Role};
    use crate::store::memory::MemoryStore;

    pub fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            identity: Arc::new(MemoryIdentity::new(1)),
            store_timeout: Duration::from_secs(2),
        }
    }

    /// Identity backend whose calls never complete.
    pub struct StalledIdentity;

    #[async_trait::async_trait]
    impl IdentityProvider for StalledIdentity {
        async fn sign_in(&self, _: &str, _: &str) -> Result<SignedIn, IdentityError> {
            std::future::pending().await
        }
        async fn create_user(&self, _: &str, _: &str, _: Option<&str>) -> Result<SignedIn, IdentityError> {
            std::future::pending().await
        }
        async fn delete_user(&self, _: &str) -> Result<(), IdentityError> {
            std::future::pending().await
        }
        async fn verify_token(&self, _: &str) -> Result<VerifiedIdentity, IdentityError> {
            std::future::pending().await
        }
        async fn get_user(&self, _: &str) -> Result<Option<IdentityRecord>, IdentityError> {
            std::future::pending().await
        }
        async fn get_user_by_email(&self, _: &str) -> Result<Option<IdentityRecord>, IdentityError> {
            std::future::pending().await
        }
        async fn set_role_claim(&self, _: &str, _: Option<Role>) -> Result<(), IdentityError> {
            std::future::pending().await
        }
    }

    pub fn stalled_identity_state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            identity: Arc::new(StalledIdentity),
            store_timeout: Duration::from_millis(50),
        }
    }

    pub fn app(state: &AppState) -> Router {
        super::router(state.clone())
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Signs up through the API and returns (token, profile id).
    pub async fn signup(app: &Router, role: &str, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            "POST",
            &format!("/api/signup/{role}"),
            None,
            Some(serde_json::json!({ "email": email, "password": "secret-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let token = body["data"]["token"].as_str().unwrap().to_string();
        let profile = &body["data"]["profile"];
        let id = profile["doctor_id"]
            .as_str()
            .or_else(|| profile["patient_id"].as_str())
            .unwrap()
            .to_string();
        (token, id)
    }
}
