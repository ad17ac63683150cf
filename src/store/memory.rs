//! In-memory [`DocumentStore`] for tests and embedding.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{RowId, StoredRow};

use super::DocumentStore;

pub struct InMemoryStore {
    rows: RwLock<Vec<StoredRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Append a row with an explicit insertion time.
    pub fn append_at(
        &self,
        document: &str,
        version_tag: &str,
        inserted_at: DateTime<Utc>,
    ) -> Result<RowId, StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let id = rows.len() as RowId + 1;
        rows.push(StoredRow {
            id,
            document: document.to_string(),
            inserted_at,
            mapper_version: version_tag.to_string(),
        });
        Ok(id)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn append(&self, document: &str, version_tag: &str) -> Result<RowId, StoreError> {
        self.append_at(document, version_tag, Utc::now())
    }

    async fn scan_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        let mut rows = self.rows.read().map_err(poisoned)?.clone();
        rows.sort_by_key(|r| (r.inserted_at, r.id));
        Ok(rows)
    }

    async fn count_rows(&self) -> Result<i64, StoreError> {
        Ok(self.rows.read().map_err(poisoned)?.len() as i64)
    }

    async fn version_breakdown(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for row in rows.iter() {
            *counts.entry(row.mapper_version.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
