//! # Routes
//!
//! Axum router configuration for the stockroom API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Catalogs:
///   - GET  /api/v1/catalogs - List catalogs
///   - GET  /api/v1/catalogs/{catalog_id}/rows?actor= - Rows offered to an actor
///   - POST /api/v1/catalogs/{catalog_id}/purchase - Buy a selection
///   - POST /api/v1/catalogs/{catalog_id}/refresh - Restock on next open
///
/// - Accounts:
///   - GET  /api/v1/accounts/{account} - Balance
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let catalog_routes = Router::new()
        .route("/catalogs", get(handlers::list_catalogs))
        .route("/catalogs/{catalog_id}/rows", get(handlers::list_rows))
        .route("/catalogs/{catalog_id}/purchase", post(handlers::purchase))
        .route("/catalogs/{catalog_id}/refresh", post(handlers::refresh_catalog));

    let account_routes = Router::new().route("/accounts/{account}", get(handlers::get_account));

    let api_routes = Router::new().merge(catalog_routes).merge(account_routes);

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        // API v1
        .nest("/api/v1", api_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use stock_core::{
        CatalogConfig, ItemDefinition, ItemRegistry, ItemSource, PurchaseItemDefinition, StockPolicy,
        StockRange,
    };
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            catalog_config: None,
            items_config: None,
            starting_funds: 250,
            rng_seed: Some(5),
            max_units_per_purchase: 10,
            environment: "test".to_string(),
        };
        let registry = ItemRegistry::new()
            .with_item(ItemDefinition::new("armchair", "Armchair", 100))
            .with_item(ItemDefinition::new("lamp", "Lamp", 40));
        let catalog = CatalogConfig::builder("furniture")
            .definition(
                PurchaseItemDefinition::new(
                    "armchairs",
                    ItemSource::Explicit {
                        items: vec!["armchair".into()],
                    },
                )
                .with_stock(StockRange::exactly(2)),
            )
            .definition(PurchaseItemDefinition::new(
                "lamps",
                ItemSource::Explicit {
                    items: vec!["lamp".into()],
                },
            ))
            .stock_policy(StockPolicy::new(3600))
            .build()
            .unwrap();
        AppState::from_parts(config, registry, vec![catalog])
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(create_router(state()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_rows_and_no_leaked_previews() {
        let state = state();
        let (status, body) = send(
            create_router(state.clone()),
            get_req("/api/v1/catalogs/furniture/rows?actor=bella"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
        assert_eq!(body["rows"][0]["stock"], 2);
        assert_eq!(state.stockroom.lock().await.host.live_previews(), 0);
    }

    #[tokio::test]
    async fn test_unknown_catalog_is_404() {
        let (status, body) = send(
            create_router(state()),
            get_req("/api/v1/catalogs/nope/rows?actor=bella"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_purchase_depletes_stock_and_funds() {
        let state = state();
        let purchase = json!({
            "actor": "bella",
            "household": "goth",
            "selection": [{ "row_id": 0, "quantity": 3 }]
        });

        let (status, body) = send(
            create_router(state.clone()),
            post_json("/api/v1/catalogs/furniture/purchase", purchase),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purchased_count"], 2);
        assert_eq!(body["failed_count"], 1);
        assert_eq!(body["total_debited"], 200);

        let (_, account) = send(create_router(state.clone()), get_req("/api/v1/accounts/goth")).await;
        assert_eq!(account["balance"], 50);

        let (_, rows) = send(
            create_router(state.clone()),
            get_req("/api/v1/catalogs/furniture/rows?actor=bella&household=goth"),
        )
        .await;
        assert_eq!(rows["rows"][0]["sold_out"], true);
    }

    #[tokio::test]
    async fn test_refresh_restocks() {
        let state = state();
        let purchase = json!({ "actor": "bella", "selection": [{ "row_id": 0, "quantity": 2 }] });
        send(
            create_router(state.clone()),
            post_json("/api/v1/catalogs/furniture/purchase", purchase),
        )
        .await;

        let (status, body) = send(
            create_router(state.clone()),
            post_json("/api/v1/catalogs/furniture/refresh", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forced"], true);

        let (_, rows) = send(
            create_router(state.clone()),
            get_req("/api/v1/catalogs/furniture/rows?actor=bella"),
        )
        .await;
        assert_eq!(rows["rows"][0]["stock"], 2);
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected() {
        let (status, body) = send(
            create_router(state()),
            post_json(
                "/api/v1/catalogs/furniture/purchase",
                json!({ "actor": "bella", "selection": [] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_selection_is_rejected() {
        let state = state();
        let purchase = json!({
            "actor": "bella",
            "selection": [
                { "row_id": 1, "quantity": u32::MAX },
                { "row_id": 1, "quantity": u32::MAX }
            ]
        });

        let (status, body) = send(
            create_router(state.clone()),
            post_json("/api/v1/catalogs/furniture/purchase", purchase),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "at most 10 units per purchase");

        let stockroom = state.stockroom.lock().await;
        assert_eq!(stockroom.host.created_count(), 0);
        assert!(stockroom.ledgers.get("furniture").is_none());
    }

    #[tokio::test]
    async fn test_mismatched_row_is_refused_as_stale() {
        let state = state();
        let (_, listed) = send(
            create_router(state.clone()),
            get_req("/api/v1/catalogs/furniture/rows?actor=bella"),
        )
        .await;
        let lamp = &listed["rows"][1];
        assert_eq!(lamp["candidate"]["item_id"], "lamp");

        // Row 0 is the armchair, but the client believes it is the lamp
        let purchase = json!({
            "actor": "bella",
            "selection": [{
                "row_id": 0,
                "quantity": 1,
                "stock_key": lamp["stock_key"],
                "price": lamp["price"]
            }]
        });
        let (status, body) = send(
            create_router(state.clone()),
            post_json("/api/v1/catalogs/furniture/purchase", purchase),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purchased_count"], 0);
        assert_eq!(body["outcomes"][0]["reason"]["kind"], "stale");
        assert_eq!(body["outcomes"][0]["reason"]["row_id"], 0);

        let (_, account) = send(create_router(state.clone()), get_req("/api/v1/accounts/bella")).await;
        assert_eq!(account["balance"], 250);
    }

    #[tokio::test]
    async fn test_list_catalogs() {
        let (status, body) = send(create_router(state()), get_req("/api/v1/catalogs")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "furniture");
        assert_eq!(body[0]["refresh_period_secs"], 3600);
    }
}
