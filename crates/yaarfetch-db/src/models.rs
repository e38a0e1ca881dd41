//! Store-side shapes that are not plain domain records.

use yaarfetch_types::models::{Order, OrderStatus, User};
use yaarfetch_types::RecordId;

/// A user together with the credential material the API never exposes.
pub struct StoredUser {
    pub user: User,
    pub password_hash: String,
}

/// Store-level filter for order listings.
///
/// With `open_feed_viewer` set, rows the viewer may not see in the open feed
/// (their own requests, requests targeted at another fetcher) are excluded
/// before the limit is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub target_offer_id: Option<RecordId>,
    pub open_feed_viewer: Option<RecordId>,
}

/// Result of the conditional `open -> accepted` write.
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(Order),
    /// The order exists but is no longer open, or is targeted at someone else.
    Unavailable,
    NotFound,
}

/// Result of a fetcher's conditional status write.
#[derive(Debug)]
pub enum StatusOutcome {
    Updated(Order),
    /// The order exists but the caller is not its current fetcher.
    NotFetcher,
    NotFound,
}
