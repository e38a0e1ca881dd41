pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod offers;
pub mod orders;
pub mod visibility;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tracing::error;

use yaarfetch_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;

/// All routes, without transport layers (CORS, tracing) which the binary adds.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/{order_id}/accept", post(orders::accept_order))
        .route("/orders/{order_id}/status", patch(orders::update_status))
        .route("/offers", post(offers::create_offer).get(offers::list_offers))
        .route(
            "/offers/{offer_id}",
            get(offers::get_offer)
                .patch(offers::update_offer)
                .delete(offers::delete_offer),
        )
        .route(
            "/chat/{order_id}/messages",
            post(messages::send_message).get(messages::get_messages),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a store call off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
