//! Append-only document storage.
//!
//! The [`DocumentStore`] trait is the only persistence contract the core
//! consumes. Rows are never updated or deleted: the corpus is the union of
//! every document ever appended, so one vehicle identifier can appear in
//! many rows, one per ingest snapshot.
//!
//! Implementations must be `Send + Sync` and safe under concurrent
//! `append`; a scan running alongside an append may or may not observe it.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`append`](DocumentStore::append) | Insert one immutable row |
//! | [`scan_all`](DocumentStore::scan_all) | Every row, oldest first |
//! | [`extract`](DocumentStore::extract) | Path extraction over every row, oldest first |
//! | [`count_rows`](DocumentStore::count_rows) | Number of stored rows |
//! | [`version_breakdown`](DocumentStore::version_breakdown) | Rows per mapper version |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ExtractionFault, StoreError};
use crate::extract::{extract_vehicles, VehicleField, VehicleTuple};
use crate::models::{RowId, StoredRow};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Extraction result for one stored row.
///
/// A row whose document cannot be read carries the fault instead of tuples;
/// the query engine logs it and moves on.
#[derive(Debug, Clone)]
pub struct RowExtract {
    pub row_id: RowId,
    pub inserted_at: DateTime<Utc>,
    pub tuples: Result<Vec<VehicleTuple>, ExtractionFault>,
}

impl RowExtract {
    pub fn from_document(
        row_id: RowId,
        inserted_at: DateTime<Utc>,
        document: &str,
        fields: &[VehicleField],
    ) -> Self {
        Self {
            row_id,
            inserted_at,
            tuples: extract_vehicles(document, fields),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one immutable row stamped with the current time.
    async fn append(&self, document: &str, version_tag: &str) -> Result<RowId, StoreError>;

    /// Every stored row ordered by (insertion time, row id).
    async fn scan_all(&self) -> Result<Vec<StoredRow>, StoreError>;

    /// Extract `fields` from every stored row, in [`scan_all`](Self::scan_all)
    /// order.
    ///
    /// The default goes through `scan_all`; backends that can stream rows
    /// should override it so only the extracted tuples are held in memory.
    async fn extract(&self, fields: &[VehicleField]) -> Result<Vec<RowExtract>, StoreError> {
        let rows = self.scan_all().await?;
        Ok(rows
            .iter()
            .map(|row| RowExtract::from_document(row.id, row.inserted_at, &row.document, fields))
            .collect())
    }

    async fn count_rows(&self) -> Result<i64, StoreError>;

    /// `(mapper_version, row_count)` pairs ordered by version.
    async fn version_breakdown(&self) -> Result<Vec<(String, i64)>, StoreError>;
}
