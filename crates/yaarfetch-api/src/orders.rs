use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};

use yaarfetch_db::{AcceptOutcome, OrderFilter, StatusOutcome};
use yaarfetch_types::RecordId;
use yaarfetch_types::api::{CreateOrderRequest, OrderResponse, OrderStatusUpdate};
use yaarfetch_types::models::{Order, OrderStatus};
use yaarfetch_types::validate::Validate;

use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::visibility;

const LIST_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status_filter: Option<String>,
    pub target_offer_id: Option<String>,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("Invalid status value '{}'", raw)))
}

/// Enrich a batch for `viewer` with one user lookup.
async fn present(
    state: &AppState,
    orders: Vec<Order>,
    viewer: RecordId,
) -> Result<Vec<OrderResponse>, ApiError> {
    let ids = visibility::participant_ids(&orders);
    let users: HashMap<_, _> = db_call(state, move |db| db.get_users(&ids))
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(orders
        .into_iter()
        .map(|order| visibility::enrich(order, &users, viewer))
        .collect())
}

async fn present_one(
    state: &AppState,
    order: Order,
    viewer: RecordId,
) -> Result<OrderResponse, ApiError> {
    present(state, vec![order], viewer)
        .await?
        .pop()
        .ok_or(ApiError::Internal)
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let target_offer_id = req
        .target_offer_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(RecordId::parse)
        .transpose()?;

    // A request aimed at an offer is only for that offer's fetcher.
    let target_fetcher_id = match target_offer_id {
        Some(offer_id) => {
            let offer = db_call(&state, move |db| db.get_offer(offer_id))
                .await?
                .ok_or(ApiError::NotFound("Offer not found"))?;
            Some(offer.fetcher_id)
        }
        None => None,
    };

    let order = Order {
        id: RecordId::new(),
        item: req.item.trim().to_string(),
        dropoff_location: req.dropoff_location.trim().to_string(),
        instructions: req
            .instructions
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        requester_id: caller.id,
        fetcher_id: None,
        target_offer_id,
        target_fetcher_id,
        status: OrderStatus::Open,
        created_at: chrono::Utc::now(),
    };

    {
        let order = order.clone();
        db_call(&state, move |db| db.insert_order(&order)).await?;
    }
    info!("Order {} created by {}", order.id, caller.id);

    let resp = present_one(&state, order, caller.id).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status_filter
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            parse_status(raw)
                .map_err(|_| ApiError::Validation(format!("Invalid status filter '{}'", raw)))
        })
        .transpose()?;
    let target_offer_id = query
        .target_offer_id
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(RecordId::parse)
        .transpose()?;

    let filter = OrderFilter {
        status,
        target_offer_id,
        open_feed_viewer: (status == Some(OrderStatus::Open)).then_some(caller.id),
    };
    let orders = db_call(&state, move |db| db.list_orders(&filter, LIST_LIMIT)).await?;
    let visible = visibility::filter_listing(orders, status, caller.id);

    Ok(Json(present(&state, visible, caller.id).await?))
}

pub async fn accept_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = RecordId::parse(&order_id)?;
    let fetcher_id = caller.id;

    let order = match db_call(&state, move |db| db.accept_order(order_id, fetcher_id)).await? {
        AcceptOutcome::Accepted(order) => order,
        AcceptOutcome::Unavailable => {
            debug!("Order {} not available to {}", order_id, fetcher_id);
            return Err(ApiError::Conflict("Order not available for acceptance"));
        }
        AcceptOutcome::NotFound => return Err(ApiError::NotFound("Order not found")),
    };
    info!("Order {} accepted by {}", order.id, fetcher_id);

    Ok(Json(present_one(&state, order, caller.id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Json(req): Json<OrderStatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_status(&req.status)?;
    let order_id = RecordId::parse(&order_id)?;

    let order = db_call(&state, move |db| db.get_order(order_id))
        .await?
        .ok_or(ApiError::NotFound("Order not found"))?;

    if !visibility::may_update_status(&order, caller.id) {
        return Err(ApiError::Forbidden("Only the assigned fetcher can update this order"));
    }

    let fetcher_id = caller.id;
    let updated = match db_call(&state, move |db| {
        db.set_order_status(order_id, fetcher_id, status)
    })
    .await?
    {
        StatusOutcome::Updated(order) => order,
        StatusOutcome::NotFetcher => {
            return Err(ApiError::Forbidden("Only the assigned fetcher can update this order"));
        }
        StatusOutcome::NotFound => return Err(ApiError::NotFound("Order not found")),
    };
    info!("Order {} moved to {} by {}", order_id, status, caller.id);

    Ok(Json(present_one(&state, updated, caller.id).await?))
}
