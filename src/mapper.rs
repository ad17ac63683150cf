//! Record mapper: one delimited row → one [`VehicleRecord`].
//!
//! The column layout is positional and fixed; any change to it requires a
//! new [`MAPPER_VERSION`], because stored rows are tagged with the version
//! that produced them.
//!
//! # Field policy
//!
//! | Column | Field | Policy |
//! |--------|-------|--------|
//! | 0 | identifier | required (empty or `N/A` rejects the batch) |
//! | 1 | designation | best-effort text |
//! | 2 | price | required (must parse and be > 0) |
//! | 3 | year | best-effort, defaults to 0 |
//! | 4 | odometer | best-effort, defaults to 0 |
//! | 5 | fuel type | best-effort text |
//! | 6 | city | best-effort text |
//! | 7 | displacement | best-effort, defaults to 0 |
//! | 8 | engine power | best-effort, defaults to 0 |
//! | 9 | transmission | best-effort text |
//! | 10 | category | best-effort text |
//! | 11 | latitude | best-effort, defaults to 0.0 |
//! | 12 | longitude | best-effort, defaults to 0.0 |

use crate::error::{IngestError, MappingError};
use crate::models::VehicleRecord;

/// Version tag of the mapper and its column layout.
pub const MAPPER_VERSION: &str = "1.0";

/// Placeholder the upstream processor writes for a missing value.
const MISSING_PLACEHOLDER: &str = "N/A";

/// Positional column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub identifier: usize,
    pub designation: usize,
    pub price: usize,
    pub year: usize,
    pub odometer: usize,
    pub fuel_type: usize,
    pub city: usize,
    pub displacement: usize,
    pub engine_power: usize,
    pub transmission: usize,
    pub category: usize,
    pub latitude: usize,
    pub longitude: usize,
}

impl ColumnLayout {
    /// Layout produced by the inventory processor, mapper version 1.0.
    pub const V1: ColumnLayout = ColumnLayout {
        identifier: 0,
        designation: 1,
        price: 2,
        year: 3,
        odometer: 4,
        fuel_type: 5,
        city: 6,
        displacement: 7,
        engine_power: 8,
        transmission: 9,
        category: 10,
        latitude: 11,
        longitude: 12,
    };

    /// Minimum number of columns a row needs to be mapped.
    pub fn min_columns(&self) -> usize {
        [
            self.identifier,
            self.designation,
            self.price,
            self.year,
            self.odometer,
            self.fuel_type,
            self.city,
            self.displacement,
            self.engine_power,
            self.transmission,
            self.category,
            self.latitude,
            self.longitude,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::V1
    }
}

/// Map one row.
pub fn map_row<S: AsRef<str>>(
    fields: &[S],
    layout: &ColumnLayout,
) -> Result<VehicleRecord, MappingError> {
    let required = layout.min_columns();
    if fields.len() < required {
        return Err(MappingError::TooFewColumns {
            found: fields.len(),
            required,
        });
    }
    let col = |i: usize| fields[i].as_ref().trim();

    let identifier = col(layout.identifier);
    if identifier.is_empty() || identifier == MISSING_PLACEHOLDER {
        return Err(MappingError::MissingIdentifier);
    }

    let raw_price = col(layout.price);
    let price: f64 = raw_price
        .parse()
        .map_err(|_| MappingError::InvalidPrice(raw_price.to_string()))?;
    if !price.is_finite() {
        return Err(MappingError::InvalidPrice(raw_price.to_string()));
    }
    if price <= 0.0 {
        return Err(MappingError::NonPositivePrice(price));
    }

    Ok(VehicleRecord {
        identifier: identifier.to_string(),
        designation: col(layout.designation).to_string(),
        price,
        year: col(layout.year).parse().unwrap_or(0),
        category: col(layout.category).to_string(),
        displacement: col(layout.displacement).parse().unwrap_or(0),
        engine_power: col(layout.engine_power).parse().unwrap_or(0),
        fuel_type: col(layout.fuel_type).to_string(),
        transmission: col(layout.transmission).to_string(),
        odometer: col(layout.odometer).parse().unwrap_or(0),
        city: col(layout.city).to_string(),
        latitude: parse_decimal_or_zero(col(layout.latitude)),
        longitude: parse_decimal_or_zero(col(layout.longitude)),
    })
}

fn parse_decimal_or_zero(s: &str) -> f64 {
    s.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Map a whole batch. Row 0 is the header and is never mapped; rows shorter
/// than the layout are skipped. The first row that fails mapping rejects the
/// batch.
pub fn map_batch(
    rows: &[Vec<String>],
    layout: &ColumnLayout,
) -> Result<Vec<VehicleRecord>, IngestError> {
    let min_columns = layout.min_columns();
    let mut records = Vec::with_capacity(rows.len().saturating_sub(1));

    for (i, row) in rows.iter().enumerate().skip(1) {
        if row.len() < min_columns {
            continue;
        }
        let record = map_row(row, layout).map_err(|source| IngestError::Mapping {
            line: i + 1,
            source,
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(IngestError::EmptyBatch);
    }
    Ok(records)
}
