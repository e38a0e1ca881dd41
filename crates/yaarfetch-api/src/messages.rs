use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use yaarfetch_types::RecordId;
use yaarfetch_types::api::{ChatMessageResponse, SendChatRequest};
use yaarfetch_types::models::{ChatMessage, Order};
use yaarfetch_types::validate::Validate;

use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

const HISTORY_LIMIT: u32 = 1000;

/// Chat on an order is limited to its requester and assigned fetcher.
async fn participant_order(
    state: &AppState,
    order_id: RecordId,
    caller: RecordId,
) -> Result<Order, ApiError> {
    let order = db_call(state, move |db| db.get_order(order_id))
        .await?
        .ok_or(ApiError::NotFound("Order not found"))?;

    if !order.is_participant(caller) {
        debug!("User {} is not a participant in order {}", caller, order_id);
        return Err(ApiError::Forbidden("Not a participant in this order"));
    }
    Ok(order)
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Json(req): Json<SendChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let order_id = RecordId::parse(&order_id)?;
    participant_order(&state, order_id, caller.id).await?;

    let msg = ChatMessage {
        id: RecordId::new(),
        order_id,
        sender_id: caller.id,
        sender_name: caller.name.clone(),
        content: req.content.trim().to_string(),
        created_at: chrono::Utc::now(),
    };

    {
        let msg = msg.clone();
        db_call(&state, move |db| db.insert_chat_message(&msg)).await?;
    }

    Ok((StatusCode::CREATED, Json(ChatMessageResponse::from(msg))))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = RecordId::parse(&order_id)?;
    participant_order(&state, order_id, caller.id).await?;

    let messages = db_call(&state, move |db| db.list_chat_messages(order_id, HISTORY_LIMIT)).await?;
    let messages: Vec<ChatMessageResponse> =
        messages.into_iter().map(ChatMessageResponse::from).collect();

    Ok(Json(messages))
}
