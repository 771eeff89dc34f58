// API module - HTTP endpoints

pub mod cards;
pub mod health;
pub mod middleware;
pub mod operations;
pub mod state;
pub mod statuses;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(statuses::router())
        .merge(cards::router())
        .merge(operations::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::seed::SeedData;
    use crate::services::tracker::TrackingService;
    use crate::store::Store;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const SEED: &str = r#"{
        "geo_statuses": [
            { "status_name": "POST-PROD", "sort_order": 1 },
            { "status_name": "DNA_EQ1", "sort_order": 2 }
        ],
        "offload_statuses": [{ "status_name": "TO BACKUP" }],
        "cards": [
            { "card_name": "A23", "statut_geo": "POST-PROD" },
            { "card_name": "A24", "statut_geo": "POST-PROD", "quarantine": true },
            { "card_name": "B66", "statut_geo": "DNA_EQ1" }
        ]
    }"#;

    async fn app_with(seed: Option<&str>) -> Router {
        let config = Config::default();
        let tracker = TrackingService::new(
            Store::memory(),
            Duration::from_millis(config.lock_timeout_ms),
            config.operations_limit,
        );
        if let Some(seed) = seed {
            let seed: SeedData = serde_json::from_str(seed).unwrap();
            seed.apply(&tracker).await.unwrap();
        }
        router(AppState::new(tracker))
    }

    async fn app() -> Router {
        app_with(Some(SEED)).await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_as(user: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-username", user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_track_and_cancel_round() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as(
                "fabt",
                "/track",
                json!({ "card": "A23", "source": "POST-PROD", "target": "DNA_EQ1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["operation"]["id"], 1);
        assert_eq!(body["operation"]["source_geo"], "POST-PROD");
        assert_eq!(body["operation"]["statut_geo"], "DNA_EQ1");
        assert_eq!(body["operation"]["username"], "fabt");

        let (_, cards) = send(&app, get("/get_cards_by_status/DNA_EQ1")).await;
        let names: Vec<_> = cards
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["card_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["A23", "B66"]);

        let (status, body) = send(&app, post_as("fabt", "/cancel_operation/1", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "CANCELLED");

        let (_, card) = send(&app, get("/get_cards_by_status/POST-PROD")).await;
        assert_eq!(card[0]["card_name"], "A23");
        assert_eq!(card[0]["statut_geo"], "POST-PROD");

        let (status, body) = send(&app, post_as("fabt", "/cancel_operation/1", Value::Null)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_cancelled");
    }

    #[tokio::test]
    async fn test_track_requires_actor() {
        let app = app().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/track")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "card": "A23", "target": "DNA_EQ1" }).to_string()))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_track_reports_stale_source_in_envelope() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as(
                "fabt",
                "/track",
                json!({ "card": "A23", "source": "DNA_EQ1", "target": "POST-PROD" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid_transition");
        assert_eq!(body["retryable"], false);
        assert!(body["message"].as_str().unwrap().contains("A23"));
    }

    #[tokio::test]
    async fn test_track_validates_request() {
        let app = app().await;

        let (status, body) = send(&app, post_as("fabt", "/track", json!({ "card": "A23" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            post_as("fabt", "/track", json!({ "card": " ", "target": "DNA_EQ1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn test_track_rejects_unreadable_body_with_envelope() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as("fabt", "/track", json!({ "target": "DNA_EQ1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation");
        assert_eq!(body["retryable"], false);
        assert!(body["message"].as_str().unwrap().contains("card"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/track")
            .header("x-username", "fabt")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_update_card_details() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as(
                "admin",
                "/update_card/A23",
                json!({ "capacity": 1024, "brand": "Sony", "card_type": "CFexpress" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capacity"], 1024);
        assert_eq!(body["brand"], "Sony");
        assert_eq!(body["statut_geo"], "POST-PROD");

        let (_, ops) = send(&app, get("/get_operations")).await;
        assert_eq!(ops, json!([]));

        let (status, body) = send(
            &app,
            post_as("admin", "/update_card/Z99", json!({ "capacity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = send(
            &app,
            post_as("admin", "/create_card", json!({ "card_name": " ", "statut_geo": "DNA_EQ1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn test_track_offload_only() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as(
                "fabt",
                "/track",
                json!({ "card": "A23", "target": "", "offload_status": "TO BACKUP", "offload_only": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["operation"]["statut_geo"], "POST-PROD");
        assert_eq!(body["operation"]["offload_status"], "TO BACKUP");

        let (status, body) = send(&app, get("/get_offload_status/A23")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["offload_status"], "TO BACKUP");
        assert_eq!(body["quarantine"], false);
    }

    #[tokio::test]
    async fn test_quarantined_cards_are_hidden_and_locked() {
        let app = app().await;

        let (_, cards) = send(&app, get("/get_cards_by_status/POST-PROD")).await;
        assert_eq!(cards.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            post_as("fabt", "/track", json!({ "card": "A24", "target": "DNA_EQ1" })),
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(body["error"], "quarantined");

        let (status, body) = send(
            &app,
            post_as("fabt", "/set_quarantine/A24", json!({ "quarantine": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quarantine"], false);

        let (_, cards) = send(&app, get("/refresh_cards")).await;
        assert_eq!(cards.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_registry_endpoints() {
        let app = app_with(None).await;

        let (status, body) = send(&app, get("/get_status_geo")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "not_configured");

        let (status, _) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(
            &app,
            post_as("admin", "/add_geo_status", json!({ "status_name": "VAULT", "sort_order": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        send(
            &app,
            post_as("admin", "/add_geo_status", json!({ "status_name": "POST-PROD", "sort_order": 1 })),
        )
        .await;

        let (status, body) = send(&app, get("/get_status_geo")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["status_name"], "POST-PROD");
        assert_eq!(body[1]["status_name"], "VAULT");

        let (status, body) = send(
            &app,
            post_as("admin", "/add_geo_status", json!({ "status_name": "VAULT" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_exists");

        let (status, _) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_card_and_search() {
        let app = app().await;

        let (status, body) = send(
            &app,
            post_as(
                "admin",
                "/create_card",
                json!({ "card_name": "A30", "statut_geo": "DNA_EQ1", "capacity": 512 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["usage"], 0);

        let (status, body) = send(
            &app,
            post_as("admin", "/create_card", json!({ "card_name": "A31", "statut_geo": "MARS" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_status");

        let (_, body) = send(&app, get("/search_cards?query=A2")).await;
        assert_eq!(body, json!([{ "card_name": "A23" }, { "card_name": "A24" }]));

        let (_, body) = send(&app, get("/search_cards")).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_operations_listing_and_filters() {
        let app = app().await;
        send(
            &app,
            post_as("fabt", "/track", json!({ "card": "A23", "target": "DNA_EQ1" })),
        )
        .await;
        send(
            &app,
            post_as("john_doe", "/track", json!({ "card": "B66", "target": "POST-PROD" })),
        )
        .await;

        let (status, body) = send(&app, get("/get_operations")).await;
        assert_eq!(status, StatusCode::OK);
        let ops = body.as_array().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0]["card_name"], "B66");
        assert!(ops[0]["timestamp"].is_string());

        let (_, body) = send(&app, get("/get_operations?username=fabt")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["card_name"], "A23");

        let (_, body) = send(&app, get("/get_operations?card=B66&limit=1")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_card_is_not_found() {
        let app = app().await;
        let (status, body) = send(&app, get("/get_offload_status/Z99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = send(&app, post_as("fabt", "/cancel_operation/99", Value::Null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }
}
