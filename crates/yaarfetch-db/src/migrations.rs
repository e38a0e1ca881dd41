use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Ordered schema steps. A step is applied once and recorded in
/// `schema_version`; new fields get a new step, existing steps never change.
const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "initial schema", V1)];

const V1: &str = "
    CREATE TABLE users (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
        phone       TEXT,
        password    TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE offers (
        id                      TEXT PRIMARY KEY,
        fetcher_id              TEXT NOT NULL REFERENCES users(id),
        current_location        TEXT NOT NULL,
        destination             TEXT NOT NULL,
        arrival_time            TEXT NOT NULL,
        pickup_capability       TEXT NOT NULL,
        contact_number          TEXT NOT NULL,
        delivery_charge         REAL,
        estimated_delivery_time TEXT NOT NULL,
        notes                   TEXT,
        created_at              TEXT NOT NULL
    );

    CREATE INDEX idx_offers_created ON offers(created_at);

    CREATE TABLE orders (
        id                  TEXT PRIMARY KEY,
        item                TEXT NOT NULL,
        dropoff_location    TEXT NOT NULL,
        instructions        TEXT,
        requester_id        TEXT NOT NULL REFERENCES users(id),
        fetcher_id          TEXT REFERENCES users(id),
        target_offer_id     TEXT REFERENCES offers(id) ON DELETE SET NULL,
        target_fetcher_id   TEXT REFERENCES users(id),
        status              TEXT NOT NULL DEFAULT 'open'
                            CHECK (status IN ('open', 'accepted', 'picked_up', 'delivered')),
        created_at          TEXT NOT NULL,
        CHECK ((fetcher_id IS NULL) = (status = 'open'))
    );

    CREATE INDEX idx_orders_status ON orders(status, created_at);
    CREATE INDEX idx_orders_target_offer ON orders(target_offer_id);

    CREATE TABLE chat_messages (
        id          TEXT PRIMARY KEY,
        order_id    TEXT NOT NULL REFERENCES orders(id),
        sender_id   TEXT NOT NULL REFERENCES users(id),
        sender_name TEXT NOT NULL,
        content     TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE INDEX idx_chat_messages_order ON chat_messages(order_id, created_at);
";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let current: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    for (version, name, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        info!("Running migration v{} ({})", version, name);
        conn.execute_batch(&format!(
            "BEGIN;\n{}\nINSERT INTO schema_version (version) VALUES ({});\nCOMMIT;",
            sql, version
        ))?;
    }

    info!("Database migrations complete");
    Ok(())
}
