//! `self/*` routes: build information, ping and liveliness.

use axum::extract::{OriginalUri, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::AppError;
use crate::health::{DetailedView, SummaryView};
use crate::info::BuildInfo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/self/info", get(info))
        .route("/self/liveliness", get(liveliness))
        .route("/self/ping", get(ping))
        .route("/self/readiness", get(not_implemented))
        .route("/self/started", get(not_implemented))
}

#[derive(Debug, Default, Deserialize)]
pub struct LivelinessQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub response: String,
}

async fn info() -> Json<BuildInfo> { Json(BuildInfo::current()) }

async fn ping() -> Json<PingResponse> {
    Json(PingResponse { response: format!("Pong - {}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)) })
}

/// 200 when every check passes, 500 otherwise. `type=detailed` adds timestamps;
/// anything else gets the summary.
async fn liveliness(State(state): State<AppState>, Query(query): Query<LivelinessQuery>) -> Response {
    let status = state.health.snapshot().await;
    let code = if status.healthy { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    match query.kind.as_deref() {
        Some("detailed") => (code, Json(DetailedView::from_status(&status, Utc::now()))).into_response(),
        _ => (code, Json(SummaryView::from_status(&status))).into_response(),
    }
}

async fn not_implemented(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::unsupported("not_implemented".to_string(), format!("{} is not implemented", uri.path()))
}
