//! Axum JSON API for the literature retriever.

use std::sync::Arc;

use anyhow::{bail, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use litr_core::{PaperQuery, ValidationError};
use litr_storage::{PaperStore, StorageError};
use litr_sync::{maybe_start_scheduler, CrawlConfig, CrawlError, CrawlRunner};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "litr-web";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub store: PaperStore,
    pub runner: Arc<CrawlRunner>,
    pub scheduler_enabled: bool,
}

impl AppState {
    pub fn new(runner: Arc<CrawlRunner>, scheduler_enabled: bool) -> Self {
        Self {
            store: runner.store().clone(),
            runner,
            scheduler_enabled,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Conflict,
    Storage(StorageError),
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Busy => ApiError::Conflict,
            CrawlError::Storage(err) => ApiError::Storage(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, "validation", err.to_string()),
            ApiError::Conflict => (
                StatusCode::CONFLICT,
                "conflict",
                CrawlError::Busy.to_string(),
            ),
            ApiError::Storage(err) => {
                error!(error = %err, "storage failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage",
                    "the paper store is unavailable".to_string(),
                )
            }
            ApiError::Internal(message) => {
                error!(%message, "internal failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    message.clone(),
                )
            }
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/papers", get(papers_handler))
        .route("/crawl/run", post(crawl_run_handler))
        .route("/crawl/status", get(crawl_status_handler))
}

/// The API router, mounted at `/` and again under `/api`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = CrawlConfig::from_env()?;
    let port = port_from_lookup(|key| std::env::var(key).ok())?;
    serve(config, port).await
}

/// Starts the scheduler (when enabled) and serves the API until ctrl-c.
pub async fn serve(config: CrawlConfig, port: u16) -> anyhow::Result<()> {
    let runner = Arc::new(CrawlRunner::from_config(config.clone()).await?);
    let scheduler = maybe_start_scheduler(&config, runner.clone()).await?;
    let state = AppState::new(runner, config.scheduler_enabled);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, feeds = config.feeds.len(), "api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving api")?;

    if let Some(mut sched) = scheduler {
        sched.shutdown().await.context("stopping scheduler")?;
    }
    info!("api stopped");
    Ok(())
}

/// `LITR_PORT` wins over `PORT`; both fall back to [`DEFAULT_PORT`].
pub fn port_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<u16> {
    for key in ["LITR_PORT", "PORT"] {
        if let Some(raw) = lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            return match raw.parse::<u16>() {
                Ok(port) => Ok(port),
                Err(_) => bail!("{key} must be a port number, got {raw:?}"),
            };
        }
    }
    Ok(DEFAULT_PORT)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler_enabled": state.scheduler_enabled,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct PapersParams {
    q: Option<String>,
    source: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

async fn papers_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PapersParams>,
) -> Result<Response, ApiError> {
    let query = PaperQuery::new(
        params.q,
        params.source,
        parse_int("limit", params.limit)?,
        parse_int("offset", params.offset)?,
    )?;
    let page = state.store.query(&query).await?;
    Ok(Json(page).into_response())
}

fn parse_int(field: &'static str, value: Option<String>) -> Result<Option<i64>, ValidationError> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::NotAnInteger { field, value: raw }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrawlRunParams {
    sync: Option<String>,
}

async fn crawl_run_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CrawlRunParams>,
) -> Result<Response, ApiError> {
    let permit = state.runner.try_begin()?;
    let run_id = permit.run_id();

    let inline = params
        .sync
        .as_deref()
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

    // The run owns its task so a dropped request cannot cut it short.
    let runner = state.runner.clone();
    let run = tokio::spawn(async move {
        let result = runner.run_with(permit).await;
        if let Err(err) = &result {
            error!(%run_id, error = %err, "crawl run failed");
        }
        result
    });

    if inline {
        info!(%run_id, "crawl triggered (sync)");
        let status = run
            .await
            .map_err(|err| ApiError::Internal(format!("crawl task ended abnormally: {err}")))??;
        return Ok(Json(status).into_response());
    }

    info!(%run_id, "crawl triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "triggered": true,
            "mode": "async",
            "run_id": run_id.to_string(),
        })),
    )
        .into_response())
}

async fn crawl_status_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let running = state.runner.is_running();
    let last_run = state.store.load_run_status().await?;
    let label = match &last_run {
        _ if running => "running",
        None => "never_run",
        Some(run) if run.is_finished() => "finished",
        Some(_) => "interrupted",
    };
    Ok(Json(json!({
        "state": label,
        "running": running,
        "scheduler_enabled": state.scheduler_enabled,
        "last_run": last_run,
    })))
}
