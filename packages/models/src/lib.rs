#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared domain types for radius-based census aggregation.
//!
//! A user marks one or more [`QueryPoint`]s (center + radius); the engine
//! finds the block groups each circle covers, weights their ACS variable
//! values by [`Overlap::percent_overlap`], and pivots the weighted sums
//! into a [`PivotTable`] with one row per point and one column per
//! variable label.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Meters in one statute mile, matching the original UI's unit toggle.
pub const METERS_PER_MILE: f64 = 1609.34;

/// A user-marked query point: a named circle center with a radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPoint {
    /// Display name, unique within a query batch (user-assigned or
    /// auto-numbered "Point N").
    pub name: String,
    /// Latitude (WGS84), in [-90, 90].
    pub latitude: f64,
    /// Longitude (WGS84), in [-180, 180].
    pub longitude: f64,
    /// Circle radius in meters. Must be > 0.
    pub radius_meters: f64,
}

impl QueryPoint {
    /// Auto-numbered name for the `index`-th point in a batch (1-based).
    #[must_use]
    pub fn auto_name(index: usize) -> String {
        format!("Point {index}")
    }
}

/// A census block group as returned by the geometry store.
///
/// Read-only to the engine; identifiers come from the TIGER shapefile
/// attribute set loaded into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct GeographyUnit {
    /// Fully-qualified GEOID (e.g. "1500000US110010001011"), the
    /// identifier the ACS `ucgid` parameter expects.
    pub geoidfq: String,
    /// Bare GEOID (state + county + tract + block group digits).
    pub geoid: Option<String>,
    /// Two-digit state FIPS code.
    pub state_fips: Option<String>,
    /// Human-readable name (e.g. "Block Group 1").
    pub name: Option<String>,
    /// Land area in square meters (TIGER `ALAND`).
    pub land_area_sq_m: Option<f64>,
    /// Water area in square meters (TIGER `AWATER`).
    pub water_area_sq_m: Option<f64>,
    /// Boundary polygon(s) in geographic (WGS84 lon/lat) coordinates.
    pub geometry: MultiPolygon<f64>,
}

/// Fractional coverage of one geography by one query circle.
///
/// Geographies with zero overlap are excluded entirely, never emitted
/// with a zero weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    /// Fully-qualified GEOID of the covered block group.
    pub geoidfq: String,
    /// Fraction of the geography's own area inside the circle, in (0, 1].
    pub percent_overlap: f64,
    /// Distance from the geography's centroid to the query point, in
    /// projected meters. Useful for proximity sorting in callers.
    pub centroid_distance_m: f64,
}

/// Metadata for one ACS variable within a table, from the variable
/// catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMeta {
    /// Human-readable label with `!!` hierarchy separators already
    /// rendered as spaces.
    pub label: String,
    /// Whether this is a point-estimate variable (id ends in `E`), as
    /// opposed to a margin-of-error or annotation variable.
    pub is_estimate: bool,
}

/// Raw variable values fetched from the ACS data endpoint.
///
/// One row per geography, one entry per requested variable column. Row
/// order carries no meaning; rows are keyed by `geoidfq`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueTable {
    /// Column names as returned in the API header row (variable ids
    /// plus bookkeeping columns like `GEO_ID` and `NAME`).
    pub columns: Vec<String>,
    /// `geoidfq` -> (column name -> raw cell value).
    pub rows: BTreeMap<String, BTreeMap<String, String>>,
}

impl ValueTable {
    /// Number of geography rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw cell value for a geography/column pair, if present.
    #[must_use]
    pub fn value(&self, geoidfq: &str, column: &str) -> Option<&str> {
        self.rows.get(geoidfq)?.get(column).map(String::as_str)
    }
}

/// One overlap-weighted aggregate: a single variable summed over every
/// geography a point's circle covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    /// Name of the query point this aggregate belongs to.
    pub point_name: String,
    /// ACS variable id (e.g. "B01001_001E").
    pub var_id: String,
    /// Human-readable variable label.
    pub label: String,
    /// `Σ overlap_i × value_i` over the covered geographies, with no
    /// renormalization.
    pub value: f64,
}

/// Final pivoted result: one row per point name, one column per
/// variable label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    /// Variable-label column names, in first-seen order.
    pub columns: Vec<String>,
    /// One row per point that produced at least one aggregate.
    pub rows: Vec<PivotRow>,
}

/// A single row of the pivoted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    /// Query point name.
    pub point_name: String,
    /// Values aligned with [`PivotTable::columns`]; `None` where the
    /// point has no aggregate for that label.
    pub values: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_names_points() {
        assert_eq!(QueryPoint::auto_name(1), "Point 1");
        assert_eq!(QueryPoint::auto_name(12), "Point 12");
    }

    #[test]
    fn value_table_lookup() {
        let table = ValueTable {
            columns: vec!["B01001_001E".to_string()],
            rows: BTreeMap::from([(
                "1500000US110010001011".to_string(),
                BTreeMap::from([("B01001_001E".to_string(), "1181".to_string())]),
            )]),
        };

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.value("1500000US110010001011", "B01001_001E"),
            Some("1181")
        );
        assert_eq!(table.value("1500000US110010001011", "B01001_002E"), None);
        assert_eq!(table.value("missing", "B01001_001E"), None);
    }
}
