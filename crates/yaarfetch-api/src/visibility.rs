//! Who sees which orders, and with which denormalized fields.
//!
//! Everything here is pure: callers fetch orders and users from the store,
//! these functions decide what a given viewer is entitled to.

use std::collections::{BTreeSet, HashMap};

use yaarfetch_types::RecordId;
use yaarfetch_types::api::OrderResponse;
use yaarfetch_types::models::{Order, OrderStatus, User};

/// Whether `order` belongs in `viewer`'s open-order feed.
///
/// Requesters never see their own requests, and an order aimed at a specific
/// fetcher is hidden from everyone else.
pub fn visible_in_open_feed(order: &Order, viewer: RecordId) -> bool {
    order.requester_id != viewer && order.target_fetcher_id.is_none_or(|target| target == viewer)
}

/// Apply the listing filter for the status the caller asked for. Only the
/// open feed is filtered; other listings are returned as fetched.
pub fn filter_listing(
    orders: Vec<Order>,
    requested: Option<OrderStatus>,
    viewer: RecordId,
) -> Vec<Order> {
    match requested {
        Some(OrderStatus::Open) => orders
            .into_iter()
            .filter(|order| visible_in_open_feed(order, viewer))
            .collect(),
        _ => orders,
    }
}

/// Which contact numbers the viewer may see on one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disclosure {
    pub requester: bool,
    pub fetcher: bool,
}

pub fn contact_disclosure(order: &Order, viewer: RecordId) -> Disclosure {
    if order.is_participant(viewer) && order.status.is_matched() {
        Disclosure {
            requester: true,
            fetcher: true,
        }
    } else if order.requester_id == viewer {
        Disclosure {
            requester: true,
            fetcher: false,
        }
    } else {
        Disclosure::default()
    }
}

/// Only the assigned fetcher moves an order through its statuses.
pub fn may_update_status(order: &Order, caller: RecordId) -> bool {
    order.fetcher_id == Some(caller)
}

/// Distinct requester and fetcher ids across `orders`, for one batched lookup.
pub fn participant_ids(orders: &[Order]) -> Vec<RecordId> {
    orders
        .iter()
        .flat_map(|order| std::iter::once(order.requester_id).chain(order.fetcher_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Attach names and, where allowed, contact numbers.
pub fn enrich(order: Order, users: &HashMap<RecordId, User>, viewer: RecordId) -> OrderResponse {
    let disclosure = contact_disclosure(&order, viewer);
    let requester = users.get(&order.requester_id);
    let fetcher = order.fetcher_id.and_then(|id| users.get(&id));

    let mut resp = OrderResponse::from(order);
    resp.requester_name = requester.map(|u| u.name.clone());
    resp.fetcher_name = fetcher.map(|u| u.name.clone());
    if disclosure.requester {
        resp.requester_contact = requester.and_then(|u| u.phone.clone());
    }
    if disclosure.fetcher {
        resp.fetcher_contact = fetcher.and_then(|u| u.phone.clone());
    }
    resp
}
