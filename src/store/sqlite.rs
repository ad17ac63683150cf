//! SQLite-backed [`DocumentStore`].
//!
//! One table, `vehicle_documents`, created by
//! [`run_migrations`](crate::migrate::run_migrations). Insertion times are
//! stored as Unix milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::extract::VehicleField;
use crate::models::{RowId, StoredRow};

use super::{DocumentStore, RowExtract};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn append(&self, document: &str, version_tag: &str) -> Result<RowId, StoreError> {
        let result = sqlx::query(
            "INSERT INTO vehicle_documents (document, inserted_at, mapper_version) VALUES (?, ?, ?)",
        )
        .bind(document)
        .bind(Utc::now().timestamp_millis())
        .bind(version_tag)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn scan_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document, inserted_at, mapper_version
            FROM vehicle_documents
            ORDER BY inserted_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredRow {
                id: row.get("id"),
                document: row.get("document"),
                inserted_at: from_millis(row.get("inserted_at")),
                mapper_version: row.get("mapper_version"),
            })
            .collect())
    }

    async fn extract(&self, fields: &[VehicleField]) -> Result<Vec<RowExtract>, StoreError> {
        let mut stream = sqlx::query(
            r#"
            SELECT id, document, inserted_at
            FROM vehicle_documents
            ORDER BY inserted_at ASC, id ASC
            "#,
        )
        .fetch(&self.pool);

        let mut extracts = Vec::new();
        while let Some(row) = stream.try_next().await? {
            let document: &str = row.try_get("document")?;
            extracts.push(RowExtract::from_document(
                row.get("id"),
                from_millis(row.get("inserted_at")),
                document,
                fields,
            ));
        }
        Ok(extracts)
    }

    async fn count_rows(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicle_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn version_breakdown(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT mapper_version, COUNT(*) AS row_count
            FROM vehicle_documents
            GROUP BY mapper_version
            ORDER BY mapper_version ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("mapper_version"), row.get("row_count")))
            .collect())
    }
}
