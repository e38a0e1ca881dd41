use crate::Database;
use crate::models::{AcceptOutcome, OrderFilter, StatusOutcome, StoredUser};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, types::Type};
use yaarfetch_types::RecordId;
use yaarfetch_types::models::{ChatMessage, Offer, Order, OrderStatus, User};

const USER_COLUMNS: &str = "id, name, email, phone, created_at, password";

const ORDER_COLUMNS: &str = "id, item, dropoff_location, instructions, requester_id, fetcher_id, \
     target_offer_id, target_fetcher_id, status, created_at";

const OFFER_COLUMNS: &str = "id, fetcher_id, current_location, destination, arrival_time, \
     pickup_capability, contact_number, delivery_charge, estimated_delivery_time, notes, created_at";

const CHAT_COLUMNS: &str = "id, order_id, sender_id, sender_name, content, created_at";

impl Database {
    // -- Users --

    /// Insert a new user. Returns `false` if the email is already taken.
    pub fn create_user(&self, user: &User, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, phone, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    user.id.to_string(),
                    &user.name,
                    &user.email,
                    &user.phone,
                    password_hash,
                    fmt_ts(&user.created_at),
                ),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    [email],
                    stored_user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    pub fn get_user(&self, id: RecordId) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    [id.to_string()],
                    stored_user_from_row,
                )
                .optional()?;
            Ok(user.map(|u| u.user))
        })
    }

    /// Batch-fetch users for a set of ids. Unknown ids are skipped.
    pub fn get_users(&self, ids: &[RecordId]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params = ids.iter().map(|id| id.to_string());
            let users = stmt
                .query_map(rusqlite::params_from_iter(params), stored_user_from_row)?
                .map(|r| r.map(|u| u.user))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(users)
        })
    }

    // -- Orders --

    pub fn insert_order(&self, order: &Order) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO orders ({ORDER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                rusqlite::params![
                    order.id.to_string(),
                    order.item,
                    order.dropoff_location,
                    order.instructions,
                    order.requester_id.to_string(),
                    order.fetcher_id.map(|id| id.to_string()),
                    order.target_offer_id.map(|id| id.to_string()),
                    order.target_fetcher_id.map(|id| id.to_string()),
                    order.status.as_str(),
                    fmt_ts(&order.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_order(&self, id: RecordId) -> Result<Option<Order>> {
        self.with_conn(|conn| query_order(conn, id))
    }

    /// Newest first, at most `limit` rows.
    pub fn list_orders(&self, filter: &OrderFilter, limit: u32) -> Result<Vec<Order>> {
        self.with_conn(|conn| {
            let mut clauses = Vec::new();
            let mut args: Vec<String> = Vec::new();
            if let Some(status) = filter.status {
                args.push(status.as_str().to_string());
                clauses.push(format!("status = ?{}", args.len()));
            }
            if let Some(offer_id) = filter.target_offer_id {
                args.push(offer_id.to_string());
                clauses.push(format!("target_offer_id = ?{}", args.len()));
            }
            if let Some(viewer) = filter.open_feed_viewer {
                args.push(viewer.to_string());
                let n = args.len();
                clauses.push(format!(
                    "requester_id != ?{n} AND (target_fetcher_id IS NULL OR target_fetcher_id = ?{n})"
                ));
            }
            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let sql = format!(
                "SELECT {ORDER_COLUMNS} FROM orders {where_sql}
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT {limit}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let orders = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), order_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(orders)
        })
    }

    /// Assign `fetcher_id` to an open order in a single conditional write.
    ///
    /// The row only changes if it is still `open` and is either untargeted or
    /// targeted at `fetcher_id`; of any number of concurrent callers at most
    /// one gets `Accepted`.
    pub fn accept_order(&self, id: RecordId, fetcher_id: RecordId) -> Result<AcceptOutcome> {
        self.with_conn(|conn| {
            let accepted = conn
                .query_row(
                    &format!(
                        "UPDATE orders SET status = 'accepted', fetcher_id = ?2
                         WHERE id = ?1
                           AND status = 'open'
                           AND (target_fetcher_id IS NULL OR target_fetcher_id = ?2)
                         RETURNING {ORDER_COLUMNS}"
                    ),
                    [id.to_string(), fetcher_id.to_string()],
                    order_from_row,
                )
                .optional()?;

            if let Some(order) = accepted {
                return Ok(AcceptOutcome::Accepted(order));
            }

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM orders WHERE id = ?1)",
                [id.to_string()],
                |row| row.get(0),
            )?;
            Ok(if exists {
                AcceptOutcome::Unavailable
            } else {
                AcceptOutcome::NotFound
            })
        })
    }

    /// Overwrite the status of an order on behalf of its current fetcher.
    ///
    /// The write only lands while `fetcher_id` still owns the order. Moving
    /// back to `open` also clears the fetcher so the order returns to the
    /// marketplace.
    pub fn set_order_status(
        &self,
        id: RecordId,
        fetcher_id: RecordId,
        status: OrderStatus,
    ) -> Result<StatusOutcome> {
        self.with_conn(|conn| {
            let updated = conn
                .query_row(
                    &format!(
                        "UPDATE orders
                         SET status = ?2,
                             fetcher_id = CASE WHEN ?2 = 'open' THEN NULL ELSE fetcher_id END
                         WHERE id = ?1 AND fetcher_id = ?3
                         RETURNING {ORDER_COLUMNS}"
                    ),
                    [id.to_string(), status.as_str().to_string(), fetcher_id.to_string()],
                    order_from_row,
                )
                .optional()?;

            if let Some(order) = updated {
                return Ok(StatusOutcome::Updated(order));
            }

            Ok(match query_order(conn, id)? {
                Some(_) => StatusOutcome::NotFetcher,
                None => StatusOutcome::NotFound,
            })
        })
    }

    // -- Offers --

    pub fn insert_offer(&self, offer: &Offer) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO offers ({OFFER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                rusqlite::params![
                    offer.id.to_string(),
                    offer.fetcher_id.to_string(),
                    offer.current_location,
                    offer.destination,
                    offer.arrival_time,
                    offer.pickup_capability,
                    offer.contact_number,
                    offer.delivery_charge,
                    offer.estimated_delivery_time,
                    offer.notes,
                    fmt_ts(&offer.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_offer(&self, id: RecordId) -> Result<Option<Offer>> {
        self.with_conn(|conn| {
            let offer = conn
                .query_row(
                    &format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = ?1"),
                    [id.to_string()],
                    offer_from_row,
                )
                .optional()?;
            Ok(offer)
        })
    }

    /// Newest first, at most `limit` rows.
    pub fn list_offers(&self, limit: u32) -> Result<Vec<Offer>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OFFER_COLUMNS} FROM offers
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1"
            ))?;
            let offers = stmt
                .query_map([limit], offer_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(offers)
        })
    }

    /// Write back every mutable field. Returns `false` if the offer is gone.
    pub fn update_offer(&self, offer: &Offer) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE offers
                 SET current_location = ?2, destination = ?3, arrival_time = ?4,
                     pickup_capability = ?5, contact_number = ?6, delivery_charge = ?7,
                     estimated_delivery_time = ?8, notes = ?9
                 WHERE id = ?1",
                rusqlite::params![
                    offer.id.to_string(),
                    offer.current_location,
                    offer.destination,
                    offer.arrival_time,
                    offer.pickup_capability,
                    offer.contact_number,
                    offer.delivery_charge,
                    offer.estimated_delivery_time,
                    offer.notes,
                ],
            )?;
            Ok(changed == 1)
        })
    }

    /// Returns `false` if there was nothing to delete.
    pub fn delete_offer(&self, id: RecordId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM offers WHERE id = ?1", [id.to_string()])?;
            Ok(deleted == 1)
        })
    }

    // -- Chat --

    pub fn insert_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO chat_messages ({CHAT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                rusqlite::params![
                    msg.id.to_string(),
                    msg.order_id.to_string(),
                    msg.sender_id.to_string(),
                    msg.sender_name,
                    msg.content,
                    fmt_ts(&msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Oldest first; insertion order breaks timestamp ties.
    pub fn list_chat_messages(&self, order_id: RecordId, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_COLUMNS} FROM chat_messages
                 WHERE order_id = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2"
            ))?;
            let messages = stmt
                .query_map(rusqlite::params![order_id.to_string(), limit], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(messages)
        })
    }
}

fn query_order(conn: &Connection, id: RecordId) -> Result<Option<Order>> {
    let order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            [id.to_string()],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

// -- Row mapping --

/// RFC 3339, microsecond precision, `Z` suffix: lexical order is time order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<RecordId> {
    let raw: String = row.get(idx)?;
    RecordId::parse(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<RecordId>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| RecordId::parse(&r).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn stored_user_from_row(row: &Row<'_>) -> rusqlite::Result<StoredUser> {
    Ok(StoredUser {
        user: User {
            id: id_at(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            created_at: ts_at(row, 4)?,
        },
        password_hash: row.get(5)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(8)?;
    Ok(Order {
        id: id_at(row, 0)?,
        item: row.get(1)?,
        dropoff_location: row.get(2)?,
        instructions: row.get(3)?,
        requester_id: id_at(row, 4)?,
        fetcher_id: opt_id_at(row, 5)?,
        target_offer_id: opt_id_at(row, 6)?,
        target_fetcher_id: opt_id_at(row, 7)?,
        status: status.parse().map_err(|e| conversion_error(8, e))?,
        created_at: ts_at(row, 9)?,
    })
}

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<Offer> {
    Ok(Offer {
        id: id_at(row, 0)?,
        fetcher_id: id_at(row, 1)?,
        current_location: row.get(2)?,
        destination: row.get(3)?,
        arrival_time: row.get(4)?,
        pickup_capability: row.get(5)?,
        contact_number: row.get(6)?,
        delivery_charge: row.get(7)?,
        estimated_delivery_time: row.get(8)?,
        notes: row.get(9)?,
        created_at: ts_at(row, 10)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: id_at(row, 0)?,
        order_id: id_at(row, 1)?,
        sender_id: id_at(row, 2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}
