#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for radius-based census aggregation.

use std::path::PathBuf;

use census_map_census::{CensusClient, DEFAULT_CATALOG_YEAR};
use census_map_database::{ingest, open, paths};
use census_map_engine::{export, run_query};
use census_map_models::{METERS_PER_MILE, PivotTable, QueryPoint};
use census_map_spatial::GeometryStore;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "census_map", about = "Radius-based census statistics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate ACS table values inside circles around query points
    Query {
        /// Query point as `LAT:LON:RADIUS` or `NAME:LAT:LON:RADIUS`.
        /// Repeat for multiple points. Unnamed points are numbered
        /// "Point 1", "Point 2", ... in argument order.
        #[arg(long = "point", required = true)]
        points: Vec<String>,
        /// Comma-separated ACS table ids (e.g. "B01001,B19013")
        #[arg(long)]
        tables: String,
        /// Variable-catalog year
        #[arg(long, default_value_t = DEFAULT_CATALOG_YEAR)]
        year: u16,
        /// Boundaries database path (defaults to the shared data dir)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Write results to this CSV file instead of stdout
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Interpret radii as statute miles instead of meters
        #[arg(long)]
        miles: bool,
    },
    /// Load block-group boundaries from GeoJSON files into the database
    Load {
        /// GeoJSON `FeatureCollection` files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Boundaries database path (defaults to the shared data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Parses one `--point` argument.
///
/// Accepts `LAT:LON:RADIUS` (auto-named from the 1-based argument
/// position) or `NAME:LAT:LON:RADIUS`.
fn parse_point(raw: &str, index: usize, miles: bool) -> Result<QueryPoint, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (name, numeric) = match parts.as_slice() {
        [lat, lon, radius] => (QueryPoint::auto_name(index), [*lat, *lon, *radius]),
        [name, lat, lon, radius] => ((*name).to_string(), [*lat, *lon, *radius]),
        _ => {
            return Err(format!(
                "Invalid point \"{raw}\": expected LAT:LON:RADIUS or NAME:LAT:LON:RADIUS"
            ));
        }
    };

    let latitude = numeric[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid latitude in point \"{raw}\""))?;
    let longitude = numeric[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid longitude in point \"{raw}\""))?;
    let radius = numeric[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid radius in point \"{raw}\""))?;

    let radius_meters = if miles { radius * METERS_PER_MILE } else { radius };

    Ok(QueryPoint {
        name,
        latitude,
        longitude,
        radius_meters,
    })
}

fn print_pivot(pivot: &PivotTable) {
    if pivot.rows.is_empty() {
        println!("No results.");
        return;
    }

    for row in &pivot.rows {
        println!("{}", row.point_name);
        for (label, value) in pivot.columns.iter().zip(&row.values) {
            match value {
                Some(v) => println!("  {label}: {v:.2}"),
                None => println!("  {label}: -"),
            }
        }
    }
}

fn open_boundaries_db(db: Option<PathBuf>) -> Result<duckdb::Connection, Box<dyn std::error::Error>> {
    let path = db.unwrap_or_else(paths::boundaries_db_path);
    Ok(open(&path)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Load { files, db } => {
            let conn = open_boundaries_db(db)?;

            let mut total = 0u64;
            for file in &files {
                log::info!("Loading {}", file.display());
                let raw = std::fs::read_to_string(file)?;
                let collection: serde_json::Value = serde_json::from_str(&raw)?;
                let count = ingest::ingest_feature_collection(&conn, &collection)?;
                log::info!("{}: {count} block groups", file.display());
                total += count;
            }

            log::info!("Load complete: {total} block groups");
        }
        Commands::Query {
            points,
            tables,
            year,
            db,
            csv,
            miles,
        } => {
            let query_points = points
                .iter()
                .enumerate()
                .map(|(i, raw)| parse_point(raw, i + 1, miles))
                .collect::<Result<Vec<_>, _>>()?;

            let table_ids: Vec<String> = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if table_ids.is_empty() {
                return Err("No tables requested".into());
            }

            let conn = open_boundaries_db(db)?;
            let store = GeometryStore::load(&conn)?;
            if store.is_empty() {
                return Err(
                    "Boundaries database is empty; run `census_map load` first".into(),
                );
            }
            log::info!("Loaded {} block-group boundaries", store.len());

            let api_key = std::env::var("CENSUS_API_KEY").ok();
            if api_key.is_none() {
                log::warn!("CENSUS_API_KEY not set; API calls may be rate-limited");
            }
            let census = CensusClient::new(api_key)?;

            let outcome = run_query(&store, &census, &query_points, &table_ids, year).await?;

            for table in &outcome.unknown_tables {
                log::warn!("Skipped unknown table {table}");
            }

            if let Some(path) = csv {
                export::write_csv_file(&outcome.pivot, &path)?;
                log::info!("Wrote {}", path.display());
            } else {
                print_pivot(&outcome.pivot);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unnamed_point_with_auto_name() {
        let point = parse_point("38.9072:-77.0369:1609.34", 1, false).unwrap();
        assert_eq!(point.name, "Point 1");
        assert!((point.latitude - 38.9072).abs() < f64::EPSILON);
        assert!((point.longitude - -77.0369).abs() < f64::EPSILON);
        assert!((point.radius_meters - 1609.34).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_named_point() {
        let point = parse_point("Home:38.9:-77.0:500", 3, false).unwrap();
        assert_eq!(point.name, "Home");
        assert!((point.radius_meters - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn miles_flag_converts_radius() {
        let point = parse_point("38.9:-77.0:2", 1, true).unwrap();
        assert!((point.radius_meters - 2.0 * METERS_PER_MILE).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_points() {
        assert!(parse_point("38.9:-77.0", 1, false).is_err());
        assert!(parse_point("a:b:c", 1, false).is_err());
        assert!(parse_point("Home:38.9:-77.0:500:extra", 1, false).is_err());
    }
}
