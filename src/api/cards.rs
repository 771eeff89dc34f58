use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::auth::{require_actor, Actor};
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{Card, CardDetails, NewCard};

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct CardName {
    pub card_name: String,
}

#[derive(Debug, Serialize)]
pub struct CardLocation {
    pub card_name: String,
    pub statut_geo: String,
}

#[derive(Debug, Serialize)]
pub struct OffloadInfo {
    pub offload_status: Option<String>,
    pub quarantine: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuarantineRequest {
    pub quarantine: bool,
}

/// Cards that can be moved out of `status`
async fn get_cards_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<Card>>> {
    let cards = state.tracker.movable_cards_at(&status).await?;
    Ok(Json(cards))
}

/// Prefix search on card names, for the card picker
async fn search_cards(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<CardName>>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let cards = state
        .tracker
        .store()
        .search_cards(query, SEARCH_LIMIT)
        .await?;

    Ok(Json(
        cards
            .into_iter()
            .map(|c| CardName {
                card_name: c.card_name,
            })
            .collect(),
    ))
}

async fn refresh_cards(State(state): State<AppState>) -> Result<Json<Vec<CardLocation>>> {
    let cards = state
        .tracker
        .store()
        .list_movable_cards()
        .await?;

    Ok(Json(
        cards
            .into_iter()
            .map(|c| CardLocation {
                card_name: c.card_name,
                statut_geo: c.geo_status,
            })
            .collect(),
    ))
}

async fn get_offload_status(
    State(state): State<AppState>,
    Path(card_name): Path<String>,
) -> Result<Json<OffloadInfo>> {
    let card = state.tracker.load_card(&card_name).await?;
    Ok(Json(OffloadInfo {
        offload_status: card.offload_status,
        quarantine: card.quarantine,
    }))
}

async fn create_card(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(data): Json<NewCard>,
) -> Result<(StatusCode, Json<Card>)> {
    let card = state.tracker.register_card(data).await?;
    tracing::debug!(card = %card.card_name, actor = %actor.username, "Card created via API");

    Ok((StatusCode::CREATED, Json(card)))
}

async fn set_quarantine(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(card_name): Path<String>,
    Json(req): Json<QuarantineRequest>,
) -> Result<Json<Card>> {
    let card = state
        .tracker
        .set_quarantine(&card_name, req.quarantine, &actor.username)
        .await?;
    Ok(Json(card))
}

/// Edits descriptive fields; geo and offload status only change through `/track`
async fn update_card(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(card_name): Path<String>,
    Json(details): Json<CardDetails>,
) -> Result<Json<Card>> {
    let card = state
        .tracker
        .update_card_details(&card_name, details, &actor.username)
        .await?;
    Ok(Json(card))
}

pub fn router() -> Router<AppState> {
    let writes = Router::new()
        .route("/create_card", post(create_card))
        .route("/set_quarantine/:card_name", post(set_quarantine))
        .route("/update_card/:card_name", post(update_card))
        .route_layer(middleware::from_fn(require_actor));

    Router::new()
        .route("/get_cards_by_status/:status", get(get_cards_by_status))
        .route("/search_cards", get(search_cards))
        .route("/refresh_cards", get(refresh_cards))
        .route("/get_offload_status/:card_name", get(get_offload_status))
        .merge(writes)
}
