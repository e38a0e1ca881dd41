use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::RecordId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub name: String,
    /// Stored trimmed and lowercased; uniqueness is case-insensitive.
    pub email: String,
    /// Source of `requester_contact` / `fetcher_contact` on enriched orders.
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of an order: `open -> accepted -> picked_up -> delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Accepted,
    PickedUp,
    Delivered,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown order status '{0}'")]
pub struct UnknownStatus(pub String);

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Open,
        OrderStatus::Accepted,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::PickedUp => "picked_up",
            Self::Delivered => "delivered",
        }
    }

    /// True once a fetcher has been assigned (every state past `open`).
    pub fn is_matched(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: RecordId,
    pub item: String,
    pub dropoff_location: String,
    pub instructions: Option<String>,
    pub requester_id: RecordId,
    /// `None` exactly while the order is `open`.
    pub fetcher_id: Option<RecordId>,
    pub target_offer_id: Option<RecordId>,
    /// When set, only this fetcher may see the order in the open feed or accept it.
    pub target_fetcher_id: Option<RecordId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_participant(&self, user_id: RecordId) -> bool {
        self.requester_id == user_id || self.fetcher_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: RecordId,
    pub order_id: RecordId,
    pub sender_id: RecordId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
