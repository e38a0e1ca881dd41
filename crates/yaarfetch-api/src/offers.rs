use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use yaarfetch_types::RecordId;
use yaarfetch_types::api::{CreateOfferRequest, OfferResponse, UpdateOfferRequest};
use yaarfetch_types::models::Offer;
use yaarfetch_types::validate::Validate;

use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

const LIST_LIMIT: u32 = 50;

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Load an offer and check that `caller` owns it.
async fn owned_offer(state: &AppState, offer_id: RecordId, caller: RecordId) -> Result<Offer, ApiError> {
    let offer = db_call(state, move |db| db.get_offer(offer_id))
        .await?
        .ok_or(ApiError::NotFound("Offer not found"))?;

    if offer.fetcher_id != caller {
        return Err(ApiError::Forbidden("Not allowed to modify this offer"));
    }
    Ok(offer)
}

pub async fn create_offer(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Json(req): Json<CreateOfferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let offer = Offer {
        id: RecordId::new(),
        fetcher_id: caller.id,
        current_location: req.current_location.trim().to_string(),
        destination: req.destination.trim().to_string(),
        arrival_time: req.arrival_time.trim().to_string(),
        pickup_capability: req.pickup_capability.trim().to_string(),
        contact_number: req.contact_number.trim().to_string(),
        delivery_charge: req.delivery_charge,
        estimated_delivery_time: req.estimated_delivery_time.trim().to_string(),
        notes: trimmed(req.notes),
        created_at: chrono::Utc::now(),
    };

    {
        let offer = offer.clone();
        db_call(&state, move |db| db.insert_offer(&offer)).await?;
    }
    info!("Offer {} posted by {}", offer.id, caller.id);

    Ok((StatusCode::CREATED, Json(OfferResponse::from(offer))))
}

pub async fn list_offers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let offers = db_call(&state, |db| db.list_offers(LIST_LIMIT)).await?;
    let offers: Vec<OfferResponse> = offers.into_iter().map(OfferResponse::from).collect();
    Ok(Json(offers))
}

pub async fn get_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let offer_id = RecordId::parse(&offer_id)?;
    let offer = db_call(&state, move |db| db.get_offer(offer_id))
        .await?
        .ok_or(ApiError::NotFound("Offer not found"))?;
    Ok(Json(OfferResponse::from(offer)))
}

pub async fn update_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Json(req): Json<UpdateOfferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let offer_id = RecordId::parse(&offer_id)?;

    let mut offer = owned_offer(&state, offer_id, caller.id).await?;
    req.apply_to(&mut offer);

    let written = {
        let offer = offer.clone();
        db_call(&state, move |db| db.update_offer(&offer)).await?
    };
    if !written {
        // Deleted between the ownership check and the write.
        return Err(ApiError::NotFound("Offer not found"));
    }
    info!("Offer {} updated", offer.id);

    Ok(Json(OfferResponse::from(offer)))
}

pub async fn delete_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let offer_id = RecordId::parse(&offer_id)?;
    owned_offer(&state, offer_id, caller.id).await?;

    if !db_call(&state, move |db| db.delete_offer(offer_id)).await? {
        return Err(ApiError::NotFound("Offer not found"));
    }
    info!("Offer {} deleted by {}", offer_id, caller.id);

    Ok(StatusCode::NO_CONTENT)
}
