//! `GeoJSON` ingest for the block-group boundary store.
//!
//! Loads FeatureCollections produced from TIGER/Line block-group
//! shapefiles (flat property map with `GEOIDFQ`, `GEOID`, `STATEFP`,
//! `NAMELSAD`, `ALAND`, `AWATER`) and upserts them into the
//! `block_groups` table.

use duckdb::{Connection, params};

use crate::DbError;

/// Summary-level prefix for fully-qualified block-group GEOIDs.
///
/// Used to reconstruct `GEOIDFQ` for older shapefile vintages that only
/// carry the bare `GEOID`.
const BLOCK_GROUP_GEOIDFQ_PREFIX: &str = "1500000US";

/// Upserts every Polygon/MultiPolygon feature of a `GeoJSON`
/// FeatureCollection into the `block_groups` table.
///
/// Features without a recoverable `GEOIDFQ` (or `GEOID` to derive one
/// from) are skipped with a warning. Returns the number of rows
/// inserted or replaced.
///
/// # Errors
///
/// Returns [`DbError`] if the payload is not a FeatureCollection or a
/// database operation fails.
pub fn ingest_feature_collection(
    conn: &Connection,
    collection: &serde_json::Value,
) -> Result<u64, DbError> {
    if collection["type"].as_str() != Some("FeatureCollection") {
        return Err(DbError::InvalidGeoJson {
            message: "Expected a FeatureCollection".to_string(),
        });
    }

    let features = collection["features"]
        .as_array()
        .ok_or_else(|| DbError::InvalidGeoJson {
            message: "No features array in FeatureCollection".to_string(),
        })?;

    let mut inserted = 0u64;

    for feature in features {
        let props = &feature["properties"];

        let geoid = props["GEOID"].as_str().unwrap_or_default();
        let geoidfq = props["GEOIDFQ"].as_str().map_or_else(
            || {
                if geoid.is_empty() {
                    String::new()
                } else {
                    format!("{BLOCK_GROUP_GEOIDFQ_PREFIX}{geoid}")
                }
            },
            ToString::to_string,
        );

        if geoidfq.is_empty() {
            log::warn!("Skipping feature with no GEOIDFQ/GEOID");
            continue;
        }

        let geometry = &feature["geometry"];
        let geometry_type = geometry["type"].as_str().unwrap_or_default();
        if geometry_type != "Polygon" && geometry_type != "MultiPolygon" {
            log::warn!("Skipping {geoidfq}: unsupported geometry type {geometry_type:?}");
            continue;
        }

        let geom_str = serde_json::to_string(geometry).unwrap_or_default();
        if geom_str.is_empty() || geom_str == "null" {
            continue;
        }

        let state_fips = props["STATEFP"].as_str().unwrap_or_default();
        let name = props["NAMELSAD"].as_str().unwrap_or_default();
        let land_area = props["ALAND"].as_f64();
        let water_area = props["AWATER"].as_f64();

        let result = conn.execute(
            "INSERT OR REPLACE INTO block_groups
                 (geoidfq, geoid, state_fips, name, land_area_sq_m, water_area_sq_m, boundary_geojson)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![geoidfq, geoid, state_fips, name, land_area, water_area, geom_str],
        )?;

        if result > 0 {
            inserted += 1;
        }
    }

    log::info!(
        "Ingested {inserted} block groups from {} features",
        features.len()
    );

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    fn square_feature(geoidfq: &str, geoid: Option<&str>) -> serde_json::Value {
        let mut properties = serde_json::json!({
            "STATEFP": "11",
            "NAMELSAD": "Block Group 1",
            "ALAND": 1_000_000,
            "AWATER": 0,
        });
        if !geoidfq.is_empty() {
            properties["GEOIDFQ"] = serde_json::json!(geoidfq);
        }
        if let Some(id) = geoid {
            properties["GEOID"] = serde_json::json!(id);
        }

        serde_json::json!({
            "type": "Feature",
            "properties": properties,
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [-77.01, 38.89], [-77.00, 38.89],
                    [-77.00, 38.90], [-77.01, 38.90],
                    [-77.01, 38.89]
                ]]
            }
        })
    }

    fn count(conn: &Connection) -> i64 {
        conn.prepare("SELECT COUNT(*) FROM block_groups")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn ingests_feature_collection() {
        let conn = open_in_memory().unwrap();
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [square_feature("1500000US110010001011", None)]
        });

        let inserted = ingest_feature_collection(&conn, &collection).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn derives_geoidfq_from_geoid() {
        let conn = open_in_memory().unwrap();
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [square_feature("", Some("110010001011"))]
        });

        ingest_feature_collection(&conn, &collection).unwrap();

        let geoidfq: String = conn
            .prepare("SELECT geoidfq FROM block_groups")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(geoidfq, "1500000US110010001011");
    }

    #[test]
    fn skips_features_without_identifiers() {
        let conn = open_in_memory().unwrap();
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [square_feature("", None)]
        });

        let inserted = ingest_feature_collection(&conn, &collection).unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn rejects_non_collection() {
        let conn = open_in_memory().unwrap();
        let result = ingest_feature_collection(&conn, &serde_json::json!({"type": "Feature"}));
        assert!(matches!(result, Err(DbError::InvalidGeoJson { .. })));
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let conn = open_in_memory().unwrap();
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                square_feature("1500000US110010001011", None),
                square_feature("1500000US110010001011", None),
            ]
        });

        ingest_feature_collection(&conn, &collection).unwrap();
        assert_eq!(count(&conn), 1);
    }
}
