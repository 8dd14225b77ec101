#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Block-group boundary storage in `DuckDB`.
//!
//! Stores census block-group polygons with their `GeoJSON` geometry as
//! plain TEXT (no spatial extension required; the spatial index lives
//! in memory, see `census_map_spatial`). The boundaries `DuckDB` lives
//! at `data/shared/boundaries.duckdb` by default.

pub mod ingest;
pub mod paths;

use std::path::Path;

use duckdb::Connection;
use thiserror::Error;

/// Errors from boundary store operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// `DuckDB` operation failed.
    #[error("Database error: {0}")]
    Duck(#[from] duckdb::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` payload was not the expected shape.
    #[error("Invalid GeoJSON: {message}")]
    InvalidGeoJson {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the boundaries `DuckDB` and ensures schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens an in-memory boundaries database with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens the boundaries DB at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&paths::boundaries_db_path())
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS block_groups (
            geoidfq TEXT PRIMARY KEY,
            geoid TEXT,
            state_fips TEXT,
            name TEXT,
            land_area_sq_m DOUBLE,
            water_area_sq_m DOUBLE,
            boundary_geojson TEXT
        );",
    )?;

    Ok(())
}
