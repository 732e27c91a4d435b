// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Metric store - the four persistence operations over SQLite

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info};

use crate::digest::{to_hex, DigestAccumulator};
use crate::error::ScanError;
use crate::metadata::Station;
use crate::metrics::MetricResult;

/// Store for per-channel metric values and their input digests.
///
/// Every call runs as an independent prepared statement; the store keeps no
/// statement state between calls. One handle serves one scan worker.
pub struct MetricStore {
    conn: Connection,
}

impl MetricStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let store = Self { conn };
        store.create_tables()?;
        info!("metric store opened at {:?}", path);
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, ScanError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), ScanError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metric_values (
                date TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                network TEXT NOT NULL,
                station TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                value REAL NOT NULL,
                digest BLOB NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (date, metric_name, network, station, channel_id)
            );

            CREATE INDEX IF NOT EXISTS idx_metric_values_date ON metric_values(date);
        "#,
        )?;
        Ok(())
    }

    /// Station-level digest for a metric and day: the per-channel digests
    /// combined in channel-id order. Empty result set yields `None`.
    pub fn get_metric_digest(
        &self,
        date: NaiveDate,
        metric_name: &str,
        station: &Station,
    ) -> Result<Option<Vec<u8>>, ScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT digest FROM metric_values
             WHERE date = ?1 AND metric_name = ?2 AND network = ?3 AND station = ?4
             ORDER BY channel_id",
        )?;
        let rows = stmt.query_map(
            params![date.to_string(), metric_name, station.network, station.name],
            |row| row.get::<_, Vec<u8>>(0),
        )?;

        let mut acc = DigestAccumulator::new();
        let mut any = false;
        for row in rows {
            acc.add_bytes(&row?);
            any = true;
        }
        Ok(any.then(|| acc.finish()))
    }

    /// Stored digest for one channel of a metric, or `None` if never stored.
    pub fn get_metric_value_digest(
        &self,
        date: NaiveDate,
        metric_name: &str,
        station: &Station,
        channel_id: &str,
    ) -> Result<Option<Vec<u8>>, ScanError> {
        let digest = self
            .conn
            .query_row(
                "SELECT digest FROM metric_values
                 WHERE date = ?1 AND metric_name = ?2 AND network = ?3
                   AND station = ?4 AND channel_id = ?5",
                params![
                    date.to_string(),
                    metric_name,
                    station.network,
                    station.name,
                    channel_id
                ],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(digest)
    }

    /// Insert every per-channel value of a metric result. Returns the number
    /// of rows written.
    pub fn insert_metric_data(&self, result: &MetricResult) -> Result<usize, ScanError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        for (id, value, digest) in result.entries() {
            tx.execute(
                "INSERT OR REPLACE INTO metric_values
                 (date, metric_name, network, station, channel_id, value, digest)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    result.date.to_string(),
                    result.metric_name,
                    result.station.network,
                    result.station.name,
                    id,
                    value,
                    digest
                ],
            )?;
            count += 1;
        }
        tx.commit()?;
        debug!(
            "stored {} value(s) for {} {} {}",
            count, result.date, result.metric_name, result.station
        );
        Ok(count)
    }

    /// Bulk dump of every stored value in `[start, end]`, as a JSON array.
    pub fn select_all(&self, start: NaiveDate, end: NaiveDate) -> Result<String, ScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, metric_name, network, station, channel_id, value, digest
             FROM metric_values
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date, metric_name, network, station, channel_id",
        )?;
        let rows = stmt.query_map(params![start.to_string(), end.to_string()], |row| {
            Ok(json!({
                "date": row.get::<_, String>(0)?,
                "metric_name": row.get::<_, String>(1)?,
                "network": row.get::<_, String>(2)?,
                "station": row.get::<_, String>(3)?,
                "channel_id": row.get::<_, String>(4)?,
                "value": row.get::<_, f64>(5)?,
                "digest": to_hex(&row.get::<_, Vec<u8>>(6)?),
            }))
        })?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(serde_json::Value::Array(values).to_string())
    }
}
