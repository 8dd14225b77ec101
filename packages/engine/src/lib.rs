#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial-overlap aggregation engine.
//!
//! The core pipeline: for each query point, buffer the center by its
//! radius in the local UTM zone, find the block groups the circle
//! intersects, compute each one's fractional area overlap, fetch the
//! requested ACS table values for those geographies, and reduce them
//! into one overlap-weighted sum per variable. Results from all
//! (point, table) pairs pivot into a single table with one row per
//! point and one column per variable label.
//!
//! Every former UI variant of this flow is a thin caller of
//! [`run_query`]; there is no per-caller logic divergence.

pub mod aggregate;
pub mod export;
pub mod overlap;

use std::collections::BTreeSet;

use census_map_census::{CensusClient, CensusError};
use census_map_models::{AggregateRow, PivotTable, QueryPoint};
use census_map_projection::ProjectionError;
use census_map_spatial::GeometryStore;
use thiserror::Error;

pub use crate::overlap::{Coverage, compute_overlaps};

/// Errors from aggregation operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Radius was zero, negative, or not a number.
    #[error("Invalid radius: {radius_meters} m (must be > 0)")]
    InvalidRadius {
        /// The offending radius.
        radius_meters: f64,
    },

    /// Coordinate validation or CRS transform failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// ACS API call failed.
    #[error(transparent)]
    Census(#[from] CensusError),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Aggregation for one query point failed.
    #[error("Query for point \"{point_name}\" failed: {source}")]
    Point {
        /// Name of the failing point.
        point_name: String,
        /// The underlying failure.
        #[source]
        source: Box<EngineError>,
    },
}

/// The geographies one query point's circle covers, with their overlap
/// fractions. Units carry full geometry for rendering/export.
#[derive(Debug, Clone)]
pub struct PointCoverage {
    /// Name of the query point.
    pub point_name: String,
    /// The computed overlaps and covered geometries.
    pub coverage: Coverage,
}

/// Result of a multi-point, multi-table aggregation run.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Final pivoted table (one row per point with data, one column
    /// per variable label).
    pub pivot: PivotTable,
    /// The un-pivoted aggregates, one per (point, variable).
    pub aggregates: Vec<AggregateRow>,
    /// Per-point coverage, for callers that render the matched
    /// block-group polygons. Points with zero coverage are included
    /// with empty coverage.
    pub coverage: Vec<PointCoverage>,
    /// Tables the catalog did not recognize; skipped without aborting
    /// the other tables.
    pub unknown_tables: Vec<String>,
}

/// Runs the full aggregation for a batch of points and tables.
///
/// Points are processed sequentially; within a point, tables are
/// processed sequentially. Overlaps are computed once per point and
/// reused across its tables. A point whose circle intersects nothing
/// produces no rows and no error. An unknown table is skipped (and
/// reported in the outcome) without aborting the others; any other
/// catalog or fetch failure aborts the whole run, wrapped with the
/// failing point's name.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRadius`] or
/// [`EngineError::Projection`] on local validation failures (before
/// any network call), [`EngineError::Point`] wrapping fetch failures
/// mid-run.
pub async fn run_query(
    store: &GeometryStore,
    census: &CensusClient,
    points: &[QueryPoint],
    tables: &[String],
    catalog_year: u16,
) -> Result<QueryOutcome, EngineError> {
    let mut aggregates: Vec<AggregateRow> = Vec::new();
    let mut coverage: Vec<PointCoverage> = Vec::new();
    let mut unknown_tables: BTreeSet<String> = BTreeSet::new();

    for point in points {
        let point_coverage = compute_overlaps(store, point)?;

        if point_coverage.overlaps.is_empty() {
            log::info!("Point \"{}\": no block groups in range", point.name);
            coverage.push(PointCoverage {
                point_name: point.name.clone(),
                coverage: point_coverage,
            });
            continue;
        }

        log::info!(
            "Point \"{}\": {} block groups covered",
            point.name,
            point_coverage.overlaps.len()
        );

        let geoidfqs: Vec<String> = point_coverage
            .overlaps
            .iter()
            .map(|o| o.geoidfq.clone())
            .collect();

        for table in tables {
            if unknown_tables.contains(table) {
                continue;
            }

            let catalog = match census.resolve_variables(table, catalog_year).await {
                Ok(catalog) => catalog,
                Err(CensusError::UnknownTable { table }) => {
                    log::error!("Unknown table {table}, skipping");
                    unknown_tables.insert(table);
                    continue;
                }
                Err(e) => {
                    return Err(EngineError::Point {
                        point_name: point.name.clone(),
                        source: Box::new(e.into()),
                    });
                }
            };

            let values = census
                .fetch_variable_values(table, &geoidfqs)
                .await
                .map_err(|e| EngineError::Point {
                    point_name: point.name.clone(),
                    source: Box::new(e.into()),
                })?;

            aggregates.extend(aggregate::aggregate(
                &point.name,
                &catalog,
                &point_coverage.overlaps,
                &values,
            ));
        }

        coverage.push(PointCoverage {
            point_name: point.name.clone(),
            coverage: point_coverage,
        });
    }

    let pivot = aggregate::pivot(&aggregates);

    Ok(QueryOutcome {
        pivot,
        aggregates,
        coverage,
        unknown_tables: unknown_tables.into_iter().collect(),
    })
}
