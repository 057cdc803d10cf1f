//!
//! provisioning controller HTTP server
//! -----------------------------------
//! Axum HTTP API for the controller. Everything lives under `/api/v1`:
//! - `self/*` reports build information and service health.
//! - `environment/*` is CRUD over the environment registry.
//!
//! Startup order: configuration, health center, schema provisioning (failure aborts),
//! repository, liveliness check, then the listener. On shutdown every check is
//! deregistered once the listener has drained.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use futures_util::FutureExt; // for catch_unwind on handler futures
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Configuration;
use crate::error::AppError;
use crate::health::center::panic_message;
use crate::health::{DbLivelinessCheck, HealthCenter};
use crate::provision::{ConnectionSettings, SchemaProvisioner};
use crate::repository::EnvironmentRepository;
use crate::store::Connector;

pub mod environment_routes;
pub mod self_routes;

pub const API_PREFIX: &str = "/api/v1";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: EnvironmentRepository,
    pub health: HealthCenter,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "status": "error", "code": self.code_str(), "message": self.message() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new().merge(self_routes::routes()).merge(environment_routes::routes());
    Router::new()
        .route("/", get(|| async { "provisioning controller ok" }))
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Provision the graph and wire up the repository and health checks.
pub async fn bootstrap<C: Connector>(config: &Configuration, connector: C) -> anyhow::Result<AppState> {
    let health = HealthCenter::new();
    let settings = ConnectionSettings::from_config(config).context("Invalid database settings")?;
    let graph = SchemaProvisioner::new(connector)
        .provision(&settings)
        .await
        .with_context(|| {
            format!(
                "Failed to provision graph '{}' in database '{}'",
                settings.graph_name(),
                settings.database_name()
            )
        })?;
    info!(database = %graph.database(), graph = %graph.name(), "Graph store ready");

    DbLivelinessCheck::new(graph.client().clone())
        .register(&health)
        .await
        .context("Failed to register the database liveliness check")?;
    Ok(AppState { repository: EnvironmentRepository::new(graph), health })
}

/// Bootstrap and serve on `service.port` until Ctrl-C.
pub async fn run<C: Connector>(config: &Configuration, connector: C) -> anyhow::Result<()> {
    let port = config.service_port()?;
    let state = bootstrap(config, connector).await?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on {}", addr);
    serve(listener, state, shutdown_signal()).await
}

/// Serve `state` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let health = state.health.clone();
    let app = router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.context("HTTP server failed")?;

    let removed = health.deregister_all().await;
    health.shutdown().await;
    info!(checks = removed, "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Runs a handler body, converting a panic into a 500 instead of dropping the connection.
pub(crate) async fn guarded<F, T, E>(what: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(Into::into),
        Err(payload) => {
            error!(target: "panic", "HTTP {} panic: {}", what, panic_message(payload.as_ref()));
            Err(AppError::internal("internal_panic", "internal server error"))
        }
    }
}
