//! RDBMS backend (§4.B), backed by `sqlx`'s async Postgres driver — the
//! same crate `ChainSafe-forest` depends on for its own persistence layer.

use async_trait::async_trait;
use drand_core::Beacon;
use futures::TryStreamExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use tokio::sync::mpsc;

use crate::callbacks::{Callback, CallbackRegistry};
use crate::error::StoreError;
use crate::store::{BeaconCursor, ChainStore};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS beacons (
    round BIGINT PRIMARY KEY,
    signature BYTEA NOT NULL,
    previous_signature BYTEA NOT NULL
)
"#;

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

struct BeaconRow {
    round: i64,
    signature: Vec<u8>,
    previous_signature: Vec<u8>,
}

impl FromRow<'_, sqlx::postgres::PgRow> for BeaconRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            round: row.try_get("round")?,
            signature: row.try_get("signature")?,
            previous_signature: row.try_get("previous_signature")?,
        })
    }
}

impl From<BeaconRow> for Beacon {
    fn from(row: BeaconRow) -> Self {
        Beacon {
            round: row.round as u64,
            signature: row.signature,
            previous_signature: row.previous_signature,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
    callbacks: CallbackRegistry,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .map_err(backend_err)?;
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(backend_err)?;
        Ok(Self {
            pool,
            callbacks: CallbackRegistry::new(),
        })
    }
}

#[async_trait]
impl ChainStore for PostgresStore {
    async fn put(&self, beacon: Beacon, prev_required: bool) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        if prev_required && beacon.round > 0 {
            let prev: Option<(i64,)> = sqlx::query_as("SELECT round FROM beacons WHERE round = $1")
                .bind(beacon.round as i64 - 1)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend_err)?;
            if prev.is_none() {
                return Err(StoreError::MissingPrevious { round: beacon.round });
            }
        }

        let existing: Option<BeaconRow> = sqlx::query_as(
            "SELECT round, signature, previous_signature FROM beacons WHERE round = $1",
        )
        .bind(beacon.round as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend_err)?;

        if let Some(row) = existing {
            let stored: Beacon = row.into();
            return if stored == beacon {
                Err(StoreError::BeaconAlreadyStored(beacon.round))
            } else {
                Err(StoreError::ConflictingBeacon(beacon.round))
            };
        }

        sqlx::query(
            "INSERT INTO beacons (round, signature, previous_signature) VALUES ($1, $2, $3)",
        )
        .bind(beacon.round as i64)
        .bind(&beacon.signature)
        .bind(&beacon.previous_signature)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        tx.commit().await.map_err(backend_err)?;
        self.callbacks.notify(beacon).await;
        Ok(())
    }

    async fn get(&self, round: u64) -> Result<Beacon, StoreError> {
        let row: Option<BeaconRow> = sqlx::query_as(
            "SELECT round, signature, previous_signature FROM beacons WHERE round = $1",
        )
        .bind(round as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.map(Beacon::from).ok_or(StoreError::NoBeaconStored)
    }

    async fn last(&self) -> Result<Beacon, StoreError> {
        let row: Option<BeaconRow> = sqlx::query_as(
            "SELECT round, signature, previous_signature FROM beacons ORDER BY round DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.map(Beacon::from).ok_or(StoreError::NoBeaconStored)
    }

    async fn del(&self, round: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM beacons WHERE round = $1")
            .bind(round as i64)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    fn cursor(&self, from_round: u64) -> BeaconCursor {
        let pool = self.pool.clone();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut rows = sqlx::query_as::<_, BeaconRow>(
                "SELECT round, signature, previous_signature FROM beacons WHERE round >= $1 ORDER BY round ASC",
            )
            .bind(from_round as i64)
            .fetch(&pool);

            loop {
                let next = rows.try_next().await;
                let item = match next {
                    Ok(Some(row)) => Ok(Beacon::from(row)),
                    Ok(None) => break,
                    Err(e) => Err(backend_err(e)),
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        BeaconCursor::new(rx)
    }

    fn add_callback(&self, id: &str, cb: Callback) {
        self.callbacks.add(id, cb);
    }

    fn remove_callback(&self, id: &str) {
        self.callbacks.remove(id);
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
