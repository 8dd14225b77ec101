#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial gateway over the block-group boundary store.
//!
//! Loads block-group polygons from `DuckDB` at startup, builds an
//! R-tree spatial index, and answers polygon-intersection queries for
//! the overlap engine: given a query circle (as a WGS84 multipolygon),
//! return every block group whose boundary intersects it.

use census_map_models::GeographyUnit;
use geo::{Intersects, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors from geometry store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be queried.
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] duckdb::Error),
}

/// A block-group polygon stored in the R-tree with its attributes.
struct StoreEntry {
    unit: GeographyUnit,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for StoreEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over block-group boundaries.
///
/// Constructed once per process from an opened boundaries `DuckDB`
/// connection and shared across all queries.
pub struct GeometryStore {
    tree: RTree<StoreEntry>,
}

impl GeometryStore {
    /// Loads block groups from the boundaries `DuckDB` and builds the
    /// R-tree index.
    ///
    /// Rows with unparseable geometry are skipped with a warning; they
    /// can never contribute a nonzero overlap.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database query fails.
    pub fn load(conn: &duckdb::Connection) -> Result<Self, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT geoidfq, geoid, state_fips, name, land_area_sq_m, water_area_sq_m, \
                    boundary_geojson \
             FROM block_groups WHERE boundary_geojson IS NOT NULL",
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            let geoidfq: String = row.get(0)?;
            let geoid: Option<String> = row.get(1)?;
            let state_fips: Option<String> = row.get(2)?;
            let name: Option<String> = row.get(3)?;
            let land_area_sq_m: Option<f64> = row.get(4)?;
            let water_area_sq_m: Option<f64> = row.get(5)?;
            let geojson_str: String = row.get(6)?;

            if geoidfq.is_empty() || geojson_str.is_empty() {
                continue;
            }

            let Some(geometry) = parse_geojson_to_multipolygon(&geojson_str) else {
                log::warn!("Failed to parse GeoJSON for block group {geoidfq}");
                continue;
            };

            let envelope = compute_envelope(&geometry);

            entries.push(StoreEntry {
                unit: GeographyUnit {
                    geoidfq,
                    geoid,
                    state_fips,
                    name,
                    land_area_sq_m,
                    water_area_sq_m,
                    geometry,
                },
                envelope,
            });
        }

        log::info!("Loaded {} block groups into spatial index", entries.len());

        Ok(Self {
            tree: RTree::bulk_load(entries),
        })
    }

    /// Number of indexed block groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no block groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns every block group whose boundary intersects the query
    /// geometry (WGS84 lon/lat coordinates).
    ///
    /// Envelope pre-filter via the R-tree, then an exact intersection
    /// predicate. An empty result is a valid outcome, not an error.
    #[must_use]
    pub fn find_intersecting(&self, query: &MultiPolygon<f64>) -> Vec<GeographyUnit> {
        let query_env = compute_envelope(query);

        let mut matches: Vec<GeographyUnit> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.unit.geometry.intersects(query))
            .map(|entry| entry.unit.clone())
            .collect();

        // R-tree iteration order is not deterministic; keep results
        // stable for idempotent aggregation runs.
        matches.sort_by(|a, b| a.geoidfq.cmp(&b.geoidfq));

        matches
    }
}

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
        match geo_geom {
            geo::Geometry::MultiPolygon(mp) => Some(mp),
            geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
            _ => None,
        }
    } else {
        None
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
