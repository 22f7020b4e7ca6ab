//! HTTP surface for the moderation web app.
//!
//! Read endpoints degrade to empty/zero payloads when the store fails; write
//! endpoints surface the failure as `{error}` with a 4xx/5xx status.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, instrument, warn};

use crate::model::{Post, RowId, Source, Stats};
use crate::service::{AdminService, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: AdminService,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub id: RowId,
    pub decision: String,
}

#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    pub username: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct Created<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Service(ServiceError::Invalid(err)) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Service(ServiceError::Store(err)) => {
                error!(?err, "store write failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Build the application router. Files under `public_dir` are served as static
/// assets, with `index.html` as the landing page.
pub fn router(service: AdminService, public_dir: impl AsRef<Path>) -> Router {
    let public_dir = public_dir.as_ref();
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/posts/pending", get(pending_posts))
        .route("/api/posts/decide", post(decide))
        .route("/api/sources", get(list_sources).post(add_source))
        .route_service("/", ServeFile::new(public_dir.join("index.html")))
        .fallback_service(ServeDir::new(public_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

#[instrument(skip_all)]
async fn stats(State(state): State<AppState>) -> Json<Stats> {
    match state.service.stats().await {
        Ok(stats) => Json(stats),
        Err(err) => {
            warn!(?err, "stats unavailable; reporting zeros");
            Json(Stats::default())
        }
    }
}

#[instrument(skip_all)]
async fn pending_posts(State(state): State<AppState>) -> Json<Data<Vec<Post>>> {
    let data = state.service.pending_posts().await.unwrap_or_else(|err| {
        warn!(?err, "pending posts unavailable; reporting none");
        Vec::new()
    });
    Json(Data { data })
}

#[instrument(skip_all)]
async fn decide(
    State(state): State<AppState>,
    payload: Result<Json<DecideRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    state.service.decide(&req.id, &req.decision).await?;
    Ok(Json(json!({ "success": true })))
}

#[instrument(skip_all)]
async fn add_source(
    State(state): State<AppState>,
    payload: Result<Json<AddSourceRequest>, JsonRejection>,
) -> Result<Json<Created<Source>>, ApiError> {
    let Json(req) = payload?;
    let data = state
        .service
        .add_source(&req.username, req.category.as_deref())
        .await?;
    Ok(Json(Created {
        success: true,
        data,
    }))
}

#[instrument(skip_all)]
async fn list_sources(State(state): State<AppState>) -> Json<Data<Vec<Source>>> {
    let data = state.service.sources().await.unwrap_or_else(|err| {
        warn!(?err, "sources unavailable; reporting none");
        Vec::new()
    });
    Json(Data { data })
}
