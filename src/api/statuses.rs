use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::auth::require_actor;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{GeoStatus, OffloadStatus};

/// Geo statuses in registry order
async fn get_status_geo(State(state): State<AppState>) -> Result<Json<Vec<GeoStatus>>> {
    let statuses = state.tracker.registry().list_geo_statuses().await?;
    Ok(Json(statuses))
}

async fn get_offload_status_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<OffloadStatus>>> {
    let statuses = state.tracker.registry().list_offload_statuses().await?;
    Ok(Json(statuses))
}

async fn add_geo_status(
    State(state): State<AppState>,
    Json(status): Json<GeoStatus>,
) -> Result<(StatusCode, Json<GeoStatus>)> {
    let status = state.tracker.registry().add_geo_status(status).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

async fn add_offload_status(
    State(state): State<AppState>,
    Json(status): Json<OffloadStatus>,
) -> Result<(StatusCode, Json<OffloadStatus>)> {
    let status = state.tracker.registry().add_offload_status(status).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .route("/add_geo_status", post(add_geo_status))
        .route("/add_offload_status", post(add_offload_status))
        .route_layer(middleware::from_fn(require_actor));

    Router::new()
        .route("/get_status_geo", get(get_status_geo))
        .route("/get_offload_status_list", get(get_offload_status_list))
        .merge(admin)
}
