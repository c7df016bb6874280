use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, AuthUser};
use super::storage::ServerStorageError;
use super::AppState;
use crate::models::{Record, StoreName};

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub enum ApiError {
    UnknownStore(String),
    Storage(ServerStorageError),
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::UnknownStore(name) => (
                StatusCode::NOT_FOUND,
                "unknown_store",
                format!("Unknown store: {}", name),
            ),
            ApiError::Storage(e @ ServerStorageError::MissingId) => {
                (StatusCode::BAD_REQUEST, "missing_id", e.to_string())
            }
            ApiError::Storage(e @ ServerStorageError::Forbidden(_)) => {
                (StatusCode::FORBIDDEN, "forbidden", e.to_string())
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    e.to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

fn parse_store(name: &str) -> Result<StoreName, ApiError> {
    name.parse()
        .map_err(|_| ApiError::UnknownStore(name.to_string()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct MeResponse {
    user_id: String,
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}

async fn list_rows(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(store): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let store = parse_store(&store)?;
    let rows = state.tables.select_all(&user.user_id, store).await?;
    Ok(Json(rows))
}

async fn upsert_row(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(store): Path<String>,
    Json(row): Json<Record>,
) -> Result<StatusCode, ApiError> {
    let store = parse_store(&store)?;
    state.tables.upsert(&user.user_id, store, &row).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_row(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((store, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let store = parse_store(&store)?;
    let removed = state.tables.delete(&user.user_id, store, &id).await?;
    if !removed {
        tracing::debug!(store = %store, id = %id, "Delete matched no owned row");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Builds the service: `/health` is public, everything else needs a bearer key.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/rest/{store}", get(list_rows).post(upsert_row))
        .route("/rest/{store}/{id}", delete(delete_row))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
