//! Corpus overview.
//!
//! Summarises what is stored: row count, vehicles across all snapshots,
//! distinct identifiers, unreadable rows, and a per-mapper-version breakdown.
//! Used by `fleet stats` to confirm that ingests are landing.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::extract::VehicleField;
use crate::store::{DocumentStore, SqliteStore};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorpusStats {
    pub rows: i64,
    pub vehicles: usize,
    pub distinct_identifiers: usize,
    pub unreadable_rows: usize,
    pub versions: Vec<(String, i64)>,
}

pub async fn collect_stats(store: &dyn DocumentStore) -> Result<CorpusStats> {
    let rows = store.count_rows().await?;
    let versions = store.version_breakdown().await?;

    let mut vehicles = 0;
    let mut unreadable_rows = 0;
    let mut identifiers = HashSet::new();
    for row in store.extract(&[VehicleField::Identifier]).await? {
        match row.tuples {
            Ok(tuples) => {
                vehicles += tuples.len();
                identifiers.extend(tuples.into_iter().map(|t| t.identifier));
            }
            Err(_) => unreadable_rows += 1,
        }
    }

    Ok(CorpusStats {
        rows,
        vehicles,
        distinct_identifiers: identifiers.len(),
        unreadable_rows,
        versions,
    })
}

/// Run the stats command: read the corpus and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
    let stats = collect_stats(store.as_ref()).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Fleet Corpus Stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.rows);
    println!("  Vehicles:    {}", stats.vehicles);
    println!("  Distinct:    {}", stats.distinct_identifiers);
    if stats.unreadable_rows > 0 {
        println!("  Unreadable:  {}", stats.unreadable_rows);
    }

    if !stats.versions.is_empty() {
        println!();
        println!("  By mapper version:");
        println!("  {:<12} {:>10}", "VERSION", "DOCUMENTS");
        for (version, count) in &stats.versions {
            println!("  {:<12} {:>10}", version, count);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
