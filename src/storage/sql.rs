use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    config::StoreConfig,
    error::StoreError,
    schema::{CollectedRecord, EnrichedVendor},
    util,
};

use super::{ConflictPolicy, PersistenceGateway, Table, UpsertReport};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS products (
        product_key   TEXT PRIMARY KEY,
        description   TEXT,
        refreshed_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        location_key  TEXT PRIMARY KEY,
        refreshed_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS records (
        record_id       TEXT PRIMARY KEY,
        observed_at     TEXT,
        vendor_id       TEXT,
        location_key    TEXT NOT NULL,
        product_key     TEXT NOT NULL,
        description     TEXT,
        list_price      TEXT,
        discount_price  TEXT,
        final_price     TEXT,
        city            TEXT,
        refreshed_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vendors (
        vendor_id       TEXT PRIMARY KEY,
        display_name    TEXT NOT NULL,
        legal_name      TEXT NOT NULL,
        street_address  TEXT NOT NULL,
        city            TEXT NOT NULL,
        location_key    TEXT NOT NULL,
        latitude        REAL,
        longitude       REAL,
        refreshed_at    TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed primary store.
///
/// Each upsert call runs in one transaction: either every row is
/// written or none is. Timestamps are stored as
/// `YYYY-MM-DD HH:MM:SS` text.
#[derive(Clone)]
pub struct SqlGateway {
    pool: SqlitePool,
}

impl SqlGateway {
    /// Opens the pool and creates the tables.
    pub async fn connect(cfg: &StoreConfig) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&cfg.database_url)?.create_if_missing(true);

        if let Some(dir) = options.get_filename().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections.max(1))
            .connect_with(options)
            .await?;

        let gateway = Self::from_pool(pool);
        gateway.migrate().await?;
        Ok(gateway)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn stamp(ts: NaiveDateTime) -> String {
    ts.format(util::TIMESTAMP_FORMAT).to_string()
}

#[async_trait::async_trait]
impl PersistenceGateway for SqlGateway {

    /// Products of the most recent ranking refresh, in insertion order.
    async fn product_keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_key FROM products
            WHERE date(refreshed_at) = (SELECT date(MAX(refreshed_at)) FROM products)
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("product_key")).collect())
    }

    async fn location_keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT location_key FROM locations ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get("location_key")).collect())
    }

    async fn known_vendor_ids(&self) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT vendor_id FROM vendors WHERE latitude IS NOT NULL AND longitude IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("vendor_id")).collect())
    }

    async fn latest_update(&self, table: Table) -> Result<Option<NaiveDateTime>, StoreError> {
        let sql = format!("SELECT MAX(refreshed_at) AS latest FROM {}", table.name());
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let latest: Option<String> = row.get("latest");

        Ok(latest.as_deref().and_then(util::parse_stored_timestamp))
    }

    async fn upsert_records(
        &self,
        records: &[CollectedRecord],
        policy: ConflictPolicy,
        refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError> {
        let on_conflict = match policy {
            ConflictPolicy::KeepExisting => "refreshed_at = excluded.refreshed_at",
            ConflictPolicy::Overwrite => {
                "observed_at = excluded.observed_at,
                 vendor_id = excluded.vendor_id,
                 location_key = excluded.location_key,
                 product_key = excluded.product_key,
                 description = excluded.description,
                 list_price = excluded.list_price,
                 discount_price = excluded.discount_price,
                 final_price = excluded.final_price,
                 city = excluded.city,
                 refreshed_at = excluded.refreshed_at"
            }
        };
        let sql = format!(
            r#"
            INSERT INTO records
            (record_id, observed_at, vendor_id, location_key, product_key, description,
             list_price, discount_price, final_price, city, refreshed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET {on_conflict}
            "#
        );
        let refreshed_at = stamp(refreshed_at);

        let mut report = UpsertReport {
            submitted: records.len(),
            ..UpsertReport::default()
        };
        let mut tx = self.pool.begin().await?;

        for r in records {
            let exists = sqlx::query("SELECT 1 FROM records WHERE record_id = ?")
                .bind(&r.record_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

            sqlx::query(&sql)
                .bind(&r.record_id)
                .bind(&r.timestamp)
                .bind(&r.vendor_id)
                .bind(&r.location_key)
                .bind(util::pad_product_key(&r.product_key))
                .bind(&r.description)
                .bind(&r.list_price)
                .bind(&r.discount_price)
                .bind(&r.final_price)
                .bind(&r.city)
                .bind(&refreshed_at)
                .execute(&mut *tx)
                .await?;

            if exists {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn upsert_vendors(
        &self,
        vendors: &[EnrichedVendor],
        policy: ConflictPolicy,
        refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError> {
        // Coordinates are never cleared by a later lookup miss.
        let on_conflict = match policy {
            ConflictPolicy::KeepExisting => {
                "latitude = COALESCE(vendors.latitude, excluded.latitude),
                 longitude = COALESCE(vendors.longitude, excluded.longitude),
                 refreshed_at = excluded.refreshed_at"
            }
            ConflictPolicy::Overwrite => {
                "display_name = excluded.display_name,
                 legal_name = excluded.legal_name,
                 street_address = excluded.street_address,
                 city = excluded.city,
                 location_key = excluded.location_key,
                 latitude = COALESCE(excluded.latitude, vendors.latitude),
                 longitude = COALESCE(excluded.longitude, vendors.longitude),
                 refreshed_at = excluded.refreshed_at"
            }
        };
        let sql = format!(
            r#"
            INSERT INTO vendors
            (vendor_id, display_name, legal_name, street_address, city, location_key,
             latitude, longitude, refreshed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(vendor_id) DO UPDATE SET {on_conflict}
            "#
        );
        let refreshed_at = stamp(refreshed_at);

        let mut report = UpsertReport {
            submitted: vendors.len(),
            ..UpsertReport::default()
        };
        let mut tx = self.pool.begin().await?;

        for e in vendors {
            let v = &e.vendor;
            let exists = sqlx::query("SELECT 1 FROM vendors WHERE vendor_id = ?")
                .bind(&v.vendor_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

            sqlx::query(&sql)
                .bind(&v.vendor_id)
                .bind(&v.display_name)
                .bind(&v.legal_name)
                .bind(&v.street_address)
                .bind(&v.city)
                .bind(&v.location_key)
                .bind(e.coordinates.map(|c| c.latitude))
                .bind(e.coordinates.map(|c| c.longitude))
                .bind(&refreshed_at)
                .execute(&mut *tx)
                .await?;

            if exists {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}
