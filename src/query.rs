//! Corpus query engine.
//!
//! Every query runs the same three stages over the whole stored corpus:
//!
//! 1. **Extraction**: [`DocumentStore::extract`] yields, per stored row, one
//!    tuple per vehicle holding the identifier and the queried attributes.
//!    The tuples are flattened into the corpus view ordered by insertion
//!    time, then row id, then document order.
//! 2. **Filter, then dedup**: tuples whose text attribute contains the term
//!    (case-insensitive) are kept, and of those only the first tuple per
//!    identifier survives. The corpus is a log of snapshots; the answers
//!    are per distinct vehicle, and the earliest stored snapshot wins.
//! 3. **Aggregation**: count, average or sum over the survivors.
//!
//! All numbers are `f64`. Sums accumulate in double precision for every
//! query alike, so precision loss on very large totals follows IEEE-754.
//!
//! A row whose document cannot be read is logged and contributes nothing;
//! only a [`StoreError`] fails a query.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::extract::{VehicleField, VehicleTuple};
use crate::models::{BrandStats, LocationStats};
use crate::store::{DocumentStore, RowExtract};

const BRAND_FIELDS: [VehicleField; 3] = [
    VehicleField::Designation,
    VehicleField::Price,
    VehicleField::Odometer,
];
const SEGMENT_FIELDS: [VehicleField; 1] = [VehicleField::Category];
const LOCATION_FIELDS: [VehicleField; 2] = [VehicleField::City, VehicleField::Price];

pub struct CorpusQueryEngine {
    store: Arc<dyn DocumentStore>,
}

impl CorpusQueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Distinct vehicles whose designation contains `term`, with their
    /// average price and odometer reading.
    pub async fn brand_stats(&self, term: &str) -> Result<BrandStats, StoreError> {
        let matches = self.distinct_matches("brand_stats", &BRAND_FIELDS, term).await?;
        if matches.is_empty() {
            return Ok(BrandStats::default());
        }

        let n = matches.len() as f64;
        let price_sum: f64 = matches.iter().map(|t| t.number(1)).sum();
        let odometer_sum: f64 = matches.iter().map(|t| t.number(2)).sum();

        Ok(BrandStats {
            count: matches.len() as i64,
            avg_price: price_sum / n,
            avg_odometer: odometer_sum / n,
        })
    }

    /// Number of distinct vehicles whose category contains `term`.
    pub async fn segment_count(&self, term: &str) -> Result<i64, StoreError> {
        let matches = self
            .distinct_matches("segment_count", &SEGMENT_FIELDS, term)
            .await?;
        Ok(matches.len() as i64)
    }

    /// Distinct vehicles whose city contains `term`, with their total price.
    pub async fn location_stats(&self, term: &str) -> Result<LocationStats, StoreError> {
        let matches = self
            .distinct_matches("location_stats", &LOCATION_FIELDS, term)
            .await?;

        Ok(LocationStats {
            count: matches.len() as i64,
            total_price: matches.iter().map(|t| t.number(1)).sum(),
        })
    }

    /// Stages 1 and 2. The filter attribute is always `fields[0]`.
    async fn distinct_matches(
        &self,
        query: &str,
        fields: &[VehicleField],
        term: &str,
    ) -> Result<Vec<VehicleTuple>, StoreError> {
        let extracts = self.store.extract(fields).await?;
        let rows = extracts.len();
        let view = corpus_view(extracts, query);
        let matches = first_per_identifier(view.into_iter().filter(|t| contains_ci(t.text(0), term)));
        debug!(query, term, rows, matches = matches.len(), "corpus query");
        Ok(matches)
    }
}

/// Flatten per-row extractions into the ordered corpus view, dropping rows
/// that faulted.
fn corpus_view(mut extracts: Vec<RowExtract>, query: &str) -> Vec<VehicleTuple> {
    extracts.sort_by_key(|e| (e.inserted_at, e.row_id));

    let mut view = Vec::new();
    for extract in extracts {
        match extract.tuples {
            Ok(tuples) => view.extend(tuples),
            Err(fault) => {
                warn!(query, row_id = extract.row_id, error = %fault, "skipping unreadable stored document");
            }
        }
    }
    view
}

/// Keep the first tuple of each identifier, preserving order.
fn first_per_identifier(tuples: impl Iterator<Item = VehicleTuple>) -> Vec<VehicleTuple> {
    let mut seen = HashSet::new();
    tuples
        .filter(|t| seen.insert(t.identifier.clone()))
        .collect()
}

/// Case-insensitive substring match. An empty needle matches everything.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_report;
    use crate::error::ExtractionFault;
    use crate::models::{Provenance, RowId, StoredRow, VehicleRecord, VehicleReport};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn vehicle(id: &str, name: &str, price: f64, km: i64, cat: &str, city: &str) -> VehicleRecord {
        VehicleRecord {
            identifier: id.to_string(),
            designation: name.to_string(),
            price,
            year: 2020,
            category: cat.to_string(),
            displacement: 1500,
            engine_power: 100,
            fuel_type: "Petrol".to_string(),
            transmission: "Manual".to_string(),
            odometer: km,
            city: city.to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    fn corolla() -> VehicleRecord {
        vehicle("V1", "Toyota Corolla", 15000.0, 50000, "Sedan", "Porto")
    }

    fn document(vehicles: Vec<VehicleRecord>) -> String {
        let report = VehicleReport::new(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            "1.0",
            Provenance::for_request("svc", "proc", "T"),
            vehicles,
        );
        encode_report(&report).unwrap()
    }

    fn engine_with(docs: Vec<Vec<VehicleRecord>>) -> CorpusQueryEngine {
        let store = InMemoryStore::new();
        for (i, vehicles) in docs.into_iter().enumerate() {
            let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, i as u32).unwrap();
            store.append_at(&document(vehicles), "1.0", at).unwrap();
        }
        CorpusQueryEngine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_single_vehicle_all_queries() {
        let engine = engine_with(vec![vec![corolla()]]);

        let brand = engine.brand_stats("toyota").await.unwrap();
        assert_eq!(brand.count, 1);
        assert_eq!(brand.avg_price, 15000.0);
        assert_eq!(brand.avg_odometer, 50000.0);

        assert_eq!(engine.segment_count("sedan").await.unwrap(), 1);

        let loc = engine.location_stats("porto").await.unwrap();
        assert_eq!(loc.count, 1);
        assert_eq!(loc.total_price, 15000.0);
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_zeros() {
        let engine = CorpusQueryEngine::new(Arc::new(InMemoryStore::new()));
        assert_eq!(engine.brand_stats("x").await.unwrap(), BrandStats::default());
        assert_eq!(engine.segment_count("x").await.unwrap(), 0);
        assert_eq!(
            engine.location_stats("x").await.unwrap(),
            LocationStats::default()
        );
    }

    #[tokio::test]
    async fn test_no_match_yields_zeros() {
        let engine = engine_with(vec![vec![corolla()]]);
        let brand = engine.brand_stats("ferrari").await.unwrap();
        assert_eq!(brand, BrandStats::default());
        assert_eq!(engine.segment_count("suv").await.unwrap(), 0);
        assert_eq!(engine.location_stats("lisboa").await.unwrap().total_price, 0.0);
    }

    #[tokio::test]
    async fn test_reingest_does_not_inflate_counts() {
        let batch = vec![
            corolla(),
            vehicle("V2", "Toyota Yaris", 9000.0, 80000, "Hatchback", "Lisboa"),
        ];
        let engine = engine_with(vec![batch.clone()]);
        let once = engine.brand_stats("toyota").await.unwrap();

        let engine = engine_with(vec![batch.clone(), batch]);
        let twice = engine.brand_stats("toyota").await.unwrap();

        assert_eq!(once.count, 2);
        assert_eq!(twice, once);
        assert_eq!(engine.location_stats("").await.unwrap().total_price, 24000.0);
    }

    #[tokio::test]
    async fn test_earliest_snapshot_wins() {
        let mut repriced = corolla();
        repriced.price = 16000.0;
        let engine = engine_with(vec![vec![corolla()], vec![repriced]]);

        let brand = engine.brand_stats("toyota").await.unwrap();
        assert_eq!(brand.count, 1);
        assert_eq!(brand.avg_price, 15000.0);
        assert_eq!(engine.location_stats("porto").await.unwrap().total_price, 15000.0);
    }

    #[tokio::test]
    async fn test_tie_break_follows_insertion_time_not_row_id() {
        let store = InMemoryStore::new();
        let mut repriced = corolla();
        repriced.price = 16000.0;
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        store.append_at(&document(vec![corolla()]), "1.0", later).unwrap();
        store.append_at(&document(vec![repriced]), "1.0", earlier).unwrap();
        let engine = CorpusQueryEngine::new(Arc::new(store));

        assert_eq!(engine.brand_stats("corolla").await.unwrap().avg_price, 16000.0);
    }

    #[tokio::test]
    async fn test_filter_applies_before_dedup() {
        // The older snapshot of V1 no longer matches after a rename; the newer
        // one does, so V1 is still counted once.
        let mut renamed = corolla();
        renamed.designation = "Lexus CT".to_string();
        let engine = engine_with(vec![vec![renamed], vec![corolla()]]);

        let brand = engine.brand_stats("toyota").await.unwrap();
        assert_eq!(brand.count, 1);
        assert_eq!(engine.brand_stats("lexus").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_case_insensitive_substring() {
        let engine = engine_with(vec![vec![corolla()]]);
        assert_eq!(engine.segment_count("sed").await.unwrap(), 1);
        assert_eq!(engine.segment_count("SEDAN").await.unwrap(), 1);
        assert_eq!(engine.brand_stats("ROLL").await.unwrap().count, 1);
        assert_eq!(engine.location_stats("oRt").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_averages_over_distinct_vehicles() {
        let engine = engine_with(vec![vec![
            vehicle("A", "BMW 320d", 20000.0, 100000, "Sedan", "Braga"),
            vehicle("B", "BMW X1", 30000.0, 50000, "SUV", "Braga"),
            vehicle("C", "Audi A3", 25000.0, 10000, "Hatchback", "Faro"),
        ]]);

        let brand = engine.brand_stats("bmw").await.unwrap();
        assert_eq!(brand.count, 2);
        assert_eq!(brand.avg_price, 25000.0);
        assert_eq!(brand.avg_odometer, 75000.0);

        let loc = engine.location_stats("braga").await.unwrap();
        assert_eq!(loc.count, 2);
        assert_eq!(loc.total_price, 50000.0);
    }

    #[tokio::test]
    async fn test_counts_bounded_by_distinct_identifiers() {
        let engine = engine_with(vec![
            vec![corolla(), vehicle("V2", "Toyota Yaris", 9000.0, 1, "Hatchback", "Porto")],
            vec![corolla()],
            vec![vehicle("V2", "Toyota Yaris", 9500.0, 2, "Hatchback", "Porto")],
        ]);
        assert_eq!(engine.brand_stats("").await.unwrap().count, 2);
        assert_eq!(engine.segment_count("").await.unwrap(), 2);
        assert_eq!(engine.location_stats("porto").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_malformed_row_is_isolated() {
        let store = InMemoryStore::new();
        store.append("<VehicleReport><Stock>", "1.0").await.unwrap();
        store.append(&document(vec![corolla()]), "1.0").await.unwrap();
        let engine = CorpusQueryEngine::new(Arc::new(store));

        let brand = engine.brand_stats("toyota").await.unwrap();
        assert_eq!(brand.count, 1);
        assert_eq!(brand.avg_price, 15000.0);
    }

    struct UnavailableStore;

    #[async_trait]
    impl DocumentStore for UnavailableStore {
        async fn append(&self, _: &str, _: &str) -> Result<RowId, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn scan_all(&self) -> Result<Vec<StoredRow>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn count_rows(&self) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn version_breakdown(&self) -> Result<Vec<(String, i64)>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_unavailable_is_hard_failure() {
        let engine = CorpusQueryEngine::new(Arc::new(UnavailableStore));
        assert!(engine.brand_stats("x").await.is_err());
        assert!(engine.segment_count("x").await.is_err());
        assert!(engine.location_stats("x").await.is_err());
    }

    #[test]
    fn test_corpus_view_orders_rows() {
        let t = |id: &str| VehicleTuple {
            identifier: id.to_string(),
            values: Vec::new(),
        };
        let at = |s: u32| Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, s).unwrap();
        let extracts = vec![
            RowExtract { row_id: 3, inserted_at: at(5), tuples: Ok(vec![t("c")]) },
            RowExtract { row_id: 2, inserted_at: at(1), tuples: Ok(vec![t("b1"), t("b2")]) },
            RowExtract {
                row_id: 1,
                inserted_at: at(1),
                tuples: Err(ExtractionFault::Malformed("x".to_string())),
            },
        ];
        let ids: Vec<_> = corpus_view(extracts, "test")
            .into_iter()
            .map(|t| t.identifier)
            .collect();
        assert_eq!(ids, vec!["b1", "b2", "c"]);
    }
}
