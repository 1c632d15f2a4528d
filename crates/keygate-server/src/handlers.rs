use axum::{Json, http::StatusCode, response::IntoResponse};
use keygate_auth::BearerAuth;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn hello() -> &'static str {
    "Hello User - Welcome to our application!"
}

/// The admin guard chain has already enforced `ROLE_ADMIN` on this route.
pub async fn admin_dashboard(BearerAuth(auth): BearerAuth) -> String {
    tracing::debug!(admin = %auth.subject(), "admin dashboard");
    "Hello Admin - Welcome to Admin Dashboard".to_string()
}
