use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::id::RecordId;
use crate::models::{ChatMessage, Offer, Order, OrderStatus, User};

// -- JWT Claims --

/// Bearer token claims. `sub` is kept as a string so that a well-signed token
/// with an unparseable subject is reported as malformed rather than failing
/// deserialization opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserPublic,
}

impl TokenResponse {
    pub fn bearer(access_token: String, user: UserPublic) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            user,
        }
    }
}

// -- Orders --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub item: String,
    pub dropoff_location: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub target_offer_id: Option<String>,
}

/// Status arrives as a raw string so that unknown values surface as a
/// validation error with our own message.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderStatusUpdate {
    pub status: String,
}

/// An order as a particular viewer is entitled to see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: RecordId,
    pub item: String,
    pub dropoff_location: String,
    pub instructions: Option<String>,
    pub requester_id: RecordId,
    pub fetcher_id: Option<RecordId>,
    pub target_offer_id: Option<RecordId>,
    pub target_fetcher_id: Option<RecordId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetcher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetcher_contact: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            item: order.item,
            dropoff_location: order.dropoff_location,
            instructions: order.instructions,
            requester_id: order.requester_id,
            fetcher_id: order.fetcher_id,
            target_offer_id: order.target_offer_id,
            target_fetcher_id: order.target_fetcher_id,
            status: order.status,
            created_at: order.created_at,
            requester_name: None,
            fetcher_name: None,
            requester_contact: None,
            fetcher_contact: None,
        }
    }
}

// -- Offers --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOfferRequest {
    pub current_location: String,
    pub destination: String,
    pub arrival_time: String,
    pub pickup_capability: String,
    pub contact_number: String,
    #[serde(default)]
    pub delivery_charge: Option<f64>,
    pub estimated_delivery_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update: absent fields are left untouched. The optional offer
/// fields distinguish absent (`None`) from an explicit `null` (`Some(None)`),
/// which clears them.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOfferRequest {
    pub current_location: Option<String>,
    pub destination: Option<String>,
    pub arrival_time: Option<String>,
    pub pickup_capability: Option<String>,
    pub contact_number: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub delivery_charge: Option<Option<f64>>,
    pub estimated_delivery_time: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

/// Only called when the key is present, so `null` becomes `Some(None)`.
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl UpdateOfferRequest {
    /// Apply the supplied fields onto `offer`.
    pub fn apply_to(self, offer: &mut Offer) {
        if let Some(v) = self.current_location {
            offer.current_location = v.trim().to_string();
        }
        if let Some(v) = self.destination {
            offer.destination = v.trim().to_string();
        }
        if let Some(v) = self.arrival_time {
            offer.arrival_time = v.trim().to_string();
        }
        if let Some(v) = self.pickup_capability {
            offer.pickup_capability = v.trim().to_string();
        }
        if let Some(v) = self.contact_number {
            offer.contact_number = v.trim().to_string();
        }
        if let Some(v) = self.delivery_charge {
            offer.delivery_charge = v;
        }
        if let Some(v) = self.estimated_delivery_time {
            offer.estimated_delivery_time = v.trim().to_string();
        }
        if let Some(v) = self.notes {
            offer.notes = v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub id: RecordId,
    pub fetcher_id: RecordId,
    pub current_location: String,
    pub destination: String,
    pub arrival_time: String,
    pub pickup_capability: String,
    pub contact_number: String,
    pub delivery_charge: Option<f64>,
    pub estimated_delivery_time: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Offer> for OfferResponse {
    fn from(offer: Offer) -> Self {
        Self {
            id: offer.id,
            fetcher_id: offer.fetcher_id,
            current_location: offer.current_location,
            destination: offer.destination,
            arrival_time: offer.arrival_time,
            pickup_capability: offer.pickup_capability,
            contact_number: offer.contact_number,
            delivery_charge: offer.delivery_charge,
            estimated_delivery_time: offer.estimated_delivery_time,
            notes: offer.notes,
            created_at: offer.created_at,
        }
    }
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: RecordId,
    pub order_id: RecordId,
    pub sender_id: RecordId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(msg: ChatMessage) -> Self {
        Self {
            id: msg.id,
            order_id: msg.order_id,
            sender_id: msg.sender_id,
            sender_name: msg.sender_name,
            content: msg.content,
            created_at: msg.created_at,
        }
    }
}
