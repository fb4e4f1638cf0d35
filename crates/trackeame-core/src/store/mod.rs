//! Persistence layer.
//!
//! Each concern has its own store trait ([`ShipmentStore`], [`EventStore`],
//! [`JobStore`], ...) and [`SqliteStore`] implements all of them. The pipeline
//! is written against the traits, so a different backend only has to provide
//! new implementations.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.
//!
//! Queries use the runtime-checked `sqlx::query` form so that no
//! `DATABASE_URL` is needed at compile time.

pub mod carrier;
pub mod event;
pub mod job;
pub mod shipment;
pub mod user;

pub use carrier::{CarrierSeed, CarrierStore, REFERENCE_CARRIERS};
pub use event::EventStore;
pub use job::{EnqueueOutcome, JobRecord, JobStatus, JobStore, NewJob};
pub use shipment::{ShipmentStore, TrackedShipment};
pub use user::UserStore;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use trackeame_types::Status;

/// SQLite-backed store for every pipeline table.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://trackeame.db?mode=rwc"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it first.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database. The pool is pinned to one connection
    /// that never expires, since each SQLite memory connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// A stored timestamp that does not parse is a decode error for its column.
pub(crate) fn parse_timestamp(raw: &str, column: &'static str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse().map_err(|e: chrono::ParseError| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: Box::new(e),
    })
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    raw.map(|raw| parse_timestamp(&raw, column)).transpose()
}

pub(crate) fn parse_status(raw: Option<String>) -> Option<Status> {
    let raw = raw?;
    match Status::parse(&raw) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unknown stored status");
            None
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the store, ingestion and worker tests.

    use chrono::Utc;
    use trackeame_types::{Carrier, Shipment, new_id};

    use super::*;

    pub async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.seed_carriers(REFERENCE_CARRIERS).await.unwrap();
        store
    }

    pub async fn carrier(store: &SqliteStore, slug: &str) -> Carrier {
        store.get_carrier_by_slug(slug).await.unwrap().unwrap()
    }

    pub async fn shipment(store: &SqliteStore, email: &str, slug: &str, code: &str) -> Shipment {
        let user = store.upsert_user(&format!("uid-{email}"), email).await.unwrap();
        let carrier = carrier(store, slug).await;
        let now = Utc::now();
        let shipment = Shipment {
            id: new_id(),
            user_id: user.id,
            carrier_id: carrier.id,
            tracking_code: code.to_owned(),
            last_status: None,
            last_event_at: None,
            last_checked_at: now,
            created_at: now,
            updated_at: now,
        };
        store.insert_shipment(&shipment).await.unwrap();
        shipment
    }
}
