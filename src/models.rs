//! Core data models used throughout Fleet Corpus.
//!
//! A [`VehicleRecord`] is created by the mapper, frozen into a
//! [`VehicleReport`] by the encoder and frozen into a [`StoredRow`] by the
//! store. Nothing is mutated after storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Identifier of a persisted document row.
pub type RowId = i64;

/// One mapped vehicle. Flat on purpose; the document hierarchy is rebuilt
/// by the encoder only.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub identifier: String,
    pub designation: String,
    pub price: f64,
    pub year: i32,
    pub category: String,
    pub displacement: i32,
    pub engine_power: i32,
    pub fuel_type: String,
    pub transmission: String,
    pub odometer: i64,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Who validated the document and which batch requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub validated_by: String,
    pub requested_by: String,
}

impl Provenance {
    /// Provenance for a request id, using the configured service prefixes.
    pub fn for_request(validator_prefix: &str, requester_prefix: &str, request_id: &str) -> Self {
        Self {
            validated_by: format!("{}-{}", validator_prefix, request_id),
            requested_by: format!("{}-{}", requester_prefix, request_id),
        }
    }
}

/// One ingest batch, ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleReport {
    pub generated_on: NaiveDate,
    pub schema_version: String,
    pub provenance: Provenance,
    pub vehicles: Vec<VehicleRecord>,
}

impl VehicleReport {
    pub fn new(
        generated_on: NaiveDate,
        schema_version: impl Into<String>,
        provenance: Provenance,
        vehicles: Vec<VehicleRecord>,
    ) -> Self {
        Self {
            generated_on,
            schema_version: schema_version.into(),
            provenance,
            vehicles,
        }
    }
}

/// A persisted document with its metadata.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: RowId,
    pub document: String,
    pub inserted_at: DateTime<Utc>,
    pub mapper_version: String,
}

/// Aggregate answer for a designation (brand/model) filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct BrandStats {
    pub count: i64,
    pub avg_price: f64,
    pub avg_odometer: f64,
}

/// Aggregate answer for a city filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct LocationStats {
    pub count: i64,
    pub total_price: f64,
}
