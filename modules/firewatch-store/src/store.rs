//! FireStore: durable fire-event and subscriber tables backed by Postgres.
//!
//! Batch writes are all-or-nothing: inserts run inside one transaction and
//! eviction is a single `DELETE ... RETURNING` statement.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use firewatch_common::{
    Detection, EventId, ExpiryCutoff, FireEvent, GeoPoint, StoreError, Subscriber,
};

type Result<T> = std::result::Result<T, StoreError>;

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct FireEventRow {
    id: Uuid,
    latitude: f64,
    longitude: f64,
    acq_date: NaiveDate,
    attributes: Json<BTreeMap<String, String>>,
    recorded_at: DateTime<Utc>,
}

impl From<FireEventRow> for FireEvent {
    fn from(row: FireEventRow) -> Self {
        FireEvent::new(
            row.id,
            Detection {
                latitude: row.latitude,
                longitude: row.longitude,
                acq_date: row.acq_date,
                attributes: row.attributes.0,
            },
            row.recorded_at,
        )
    }
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    push_token: Option<String>,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        Subscriber {
            id: row.id,
            location,
            push_token: row.push_token.filter(|t| !t.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// FireStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FireStore {
    pool: PgPool,
}

impl FireStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        info!("Fire store schema ready");
        Ok(())
    }

    /// Every stored fire event.
    pub async fn scan_all(&self) -> Result<Vec<FireEvent>> {
        let rows = sqlx::query_as::<_, FireEventRow>(
            r#"
            SELECT id, latitude, longitude, acq_date, attributes, recorded_at
            FROM fire_events
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(FireEvent::from).collect())
    }

    /// Insert detections in one transaction. Returns store-assigned ids in
    /// input order. Nothing is written if any insert fails.
    pub async fn insert_batch(
        &self,
        detections: &[Detection],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventId>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut ids = Vec::with_capacity(detections.len());

        for detection in detections {
            let (id,) = sqlx::query_as::<_, (Uuid,)>(
                r#"
                INSERT INTO fire_events (latitude, longitude, acq_date, attributes, recorded_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(detection.latitude)
            .bind(detection.longitude)
            .bind(detection.acq_date)
            .bind(Json(&detection.attributes))
            .bind(recorded_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
            ids.push(id);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(ids)
    }

    /// Delete every event strictly older than the cutoff. Returns the deleted ids.
    pub async fn delete_expired(&self, cutoff: &ExpiryCutoff) -> Result<Vec<EventId>> {
        let rows = match *cutoff {
            ExpiryCutoff::RecordedBefore(ts) => {
                sqlx::query_as::<_, (Uuid,)>(
                    "DELETE FROM fire_events WHERE recorded_at < $1 RETURNING id",
                )
                .bind(ts)
                .fetch_all(&self.pool)
                .await
            }
            ExpiryCutoff::AcquiredBefore(date) => {
                sqlx::query_as::<_, (Uuid,)>(
                    "DELETE FROM fire_events WHERE acq_date < $1 RETURNING id",
                )
                .bind(date)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Every subscriber, including those without a location or token.
    pub async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, SubscriberRow>(
            "SELECT id, latitude, longitude, push_token FROM subscribers",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    /// Remove a subscriber's push token after the transport rejected it.
    pub async fn clear_subscriber_token(&self, subscriber_id: &str) -> Result<()> {
        sqlx::query("UPDATE subscribers SET push_token = NULL WHERE id = $1")
            .bind(subscriber_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Create or replace a subscriber record.
    pub async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (id, latitude, longitude, push_token)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                push_token = EXCLUDED.push_token
            "#,
        )
        .bind(&subscriber.id)
        .bind(subscriber.location.map(|p| p.lat))
        .bind(subscriber.location.map(|p| p.lng))
        .bind(subscriber.push_token.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS fire_events (
        id           UUID              PRIMARY KEY DEFAULT gen_random_uuid(),
        latitude     DOUBLE PRECISION  NOT NULL,
        longitude    DOUBLE PRECISION  NOT NULL,
        acq_date     DATE              NOT NULL,
        attributes   JSONB             NOT NULL DEFAULT '{}'::jsonb,
        recorded_at  TIMESTAMPTZ       NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS fire_events_recorded_at_idx ON fire_events (recorded_at)",
    "CREATE INDEX IF NOT EXISTS fire_events_acq_date_idx ON fire_events (acq_date)",
    r#"
    CREATE TABLE IF NOT EXISTS subscribers (
        id          TEXT              PRIMARY KEY,
        latitude    DOUBLE PRECISION,
        longitude   DOUBLE PRECISION,
        push_token  TEXT
    )
    "#,
];
