//! Geometric overlap computation between a query circle and block
//! groups.
//!
//! The circle is buffered in the point's local UTM zone so the radius
//! is metrically correct, then reprojected to WGS84 for the store
//! query. The area ratio itself is computed in unprojected geographic
//! coordinates: numerator and denominator share the same CRS, so the
//! latitude-dependent distortion approximately cancels. This is an
//! accepted approximation, not a geodesically exact area computation;
//! the residual error is far below the ACS margins of error on the
//! values being weighted.

use census_map_models::{GeographyUnit, Overlap, QueryPoint};
use census_map_projection::{UtmTransformer, circle_polygon};
use census_map_spatial::GeometryStore;
use geo::{Area, BooleanOps, Centroid, Coord, MultiPolygon};

use crate::EngineError;

/// Result of [`compute_overlaps`] for one query point.
#[derive(Debug, Clone, Default)]
pub struct Coverage {
    /// Overlap fraction per covered geography, every fraction in (0, 1].
    pub overlaps: Vec<Overlap>,
    /// The covered geographies themselves (same order as `overlaps`),
    /// for callers that render or export the matched polygons.
    pub units: Vec<GeographyUnit>,
}

/// Computes the fractional overlap of every intersecting block group
/// with a query point's circle.
///
/// Geographies with zero overlap (including empty geometries) are
/// excluded entirely, never emitted with a zero weight: a downstream
/// join must not see them. An empty result means no geographies are in
/// range, which is a valid outcome.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRadius`] if the radius is not a
/// positive number, [`EngineError::Projection`] for out-of-range
/// coordinates or transform failures. Both are local validation
/// failures raised before any store access.
pub fn compute_overlaps(
    store: &GeometryStore,
    point: &QueryPoint,
) -> Result<Coverage, EngineError> {
    if point.radius_meters.is_nan() || point.radius_meters <= 0.0 {
        return Err(EngineError::InvalidRadius {
            radius_meters: point.radius_meters,
        });
    }

    let transformer = UtmTransformer::for_point(point.latitude, point.longitude)?;
    let (center_x, center_y) = transformer.project(point.longitude, point.latitude)?;

    // Exact planar buffer of the center point in projected meters,
    // tessellated at the resolution documented on `circle_polygon`.
    let circle_utm = circle_polygon(
        Coord {
            x: center_x,
            y: center_y,
        },
        point.radius_meters,
    );

    let circle_wgs84 = MultiPolygon(vec![transformer.unproject_polygon(&circle_utm)?]);

    let candidates = store.find_intersecting(&circle_wgs84);

    log::debug!(
        "Point \"{}\" (EPSG:{}): {} candidate block groups",
        point.name,
        transformer.epsg(),
        candidates.len()
    );

    let mut coverage = Coverage::default();

    for unit in candidates {
        let geometry_area = unit.geometry.unsigned_area();
        if geometry_area <= 0.0 {
            // Empty geometry counts as zero overlap, not an error
            continue;
        }

        let intersection_area = unit.geometry.intersection(&circle_wgs84).unsigned_area();
        let percent_overlap = (intersection_area / geometry_area).min(1.0);

        if percent_overlap <= 0.0 {
            continue;
        }

        let Some(centroid) = unit.geometry.centroid() else {
            continue;
        };
        let (cx, cy) = transformer.project(centroid.x(), centroid.y())?;
        let centroid_distance_m = (cx - center_x).hypot(cy - center_y);

        coverage.overlaps.push(Overlap {
            geoidfq: unit.geoidfq.clone(),
            percent_overlap,
            centroid_distance_m,
        });
        coverage.units.push(unit);
    }

    Ok(coverage)
}
