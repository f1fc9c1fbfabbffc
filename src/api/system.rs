//! Health endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: bool,
    pub credentials: CredentialHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialHealth {
    Configured,
    Absent,
    Corrupt,
    Mock,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub mock_mode: bool,
    pub checks: HealthChecks,
}

/// `GET /`
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "Cloud Valet API is running!",
    })
}

/// `GET /api/system/health`
///
/// Pings the database and inspects the credential vault. Answers 503 when the
/// database is unreachable.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let mock_mode = state.config().read().await.azure.mock_mode;

    let credentials = if mock_mode {
        CredentialHealth::Mock
    } else {
        match state.vault().summary().await {
            Ok(Some(_)) => CredentialHealth::Configured,
            Ok(None) => CredentialHealth::Absent,
            Err(e) => {
                tracing::warn!(error = %e, "Credential vault unreadable");
                CredentialHealth::Corrupt
            }
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthResponse {
            healthy: database,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            mock_mode,
            checks: HealthChecks {
                database,
                credentials,
            },
        })),
    )
        .into_response()
}
