use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::auth::{require_actor, Actor};
use crate::api::state::AppState;
use crate::error::{Result, TrackingError};
use crate::models::{Operation, OperationFilter};
use crate::services::tracker::MoveRequest;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub card: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub offload_status: Option<String>,
    // Change only the offload status, keep the card where it is
    #[serde(default)]
    pub offload_only: bool,
}

/// Envelope returned by `/track`
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl TrackResponse {
    fn failure(status: StatusCode, error: &str, message: String, retryable: bool) -> Response {
        let body = Json(TrackResponse {
            success: false,
            message: Some(message),
            error: Some(error.to_string()),
            retryable,
            operation: None,
        });

        if retryable {
            (status, [(header::RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

fn move_failure(err: TrackingError) -> Response {
    if let TrackingError::Database(e) = &err {
        tracing::error!(error = %e, "Database failure during move");
    }
    TrackResponse::failure(
        err.status_code(),
        err.code(),
        err.public_message(),
        err.is_retryable(),
    )
}

// Form fields left empty by the view arrive as ""
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Operation history, newest first
async fn get_operations(
    State(state): State<AppState>,
    Query(filter): Query<OperationFilter>,
) -> Result<Json<Vec<Operation>>> {
    let operations = state.tracker.operations(&filter).await?;
    Ok(Json(operations))
}

/// Moves a card; always answers with the `{success, message}` envelope
async fn track(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: std::result::Result<Json<TrackRequest>, JsonRejection>,
) -> Response {
    // Malformed bodies still get the envelope
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return TrackResponse::failure(
                StatusCode::BAD_REQUEST,
                "validation",
                rejection.body_text(),
                false,
            );
        }
    };

    let card_name = req.card.trim().to_string();
    if card_name.is_empty() {
        return TrackResponse::failure(
            StatusCode::BAD_REQUEST,
            "validation",
            "Please select a card".to_string(),
            false,
        );
    }

    let target = non_blank(req.target);
    if target.is_none() && !req.offload_only {
        return TrackResponse::failure(
            StatusCode::BAD_REQUEST,
            "validation",
            "Please select a destination".to_string(),
            false,
        );
    }

    let request = MoveRequest {
        card_name,
        source: non_blank(req.source),
        target: if req.offload_only { None } else { target },
        offload_status: non_blank(req.offload_status),
        actor: actor.username,
    };

    match state.tracker.move_card(request).await {
        Ok(operation) => {
            let message = format!(
                "Card {} moved from {} to {}",
                operation.card_name, operation.source_geo, operation.target_geo
            );
            Json(TrackResponse {
                success: true,
                message: Some(message),
                error: None,
                retryable: false,
                operation: Some(operation),
            })
            .into_response()
        }
        Err(e) => move_failure(e),
    }
}

async fn cancel_operation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(operation_id): Path<i64>,
) -> Result<Json<Operation>> {
    let operation = state.tracker.cancel(operation_id, &actor.username).await?;
    Ok(Json(operation))
}

pub fn router() -> Router<AppState> {
    let writes = Router::new()
        .route("/track", post(track))
        .route("/cancel_operation/:id", post(cancel_operation))
        .route_layer(middleware::from_fn(require_actor));

    Router::new()
        .route("/get_operations", get(get_operations))
        .merge(writes)
}
