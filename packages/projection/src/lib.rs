#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! UTM zone resolution and WGS84 <-> UTM coordinate transforms.
//!
//! Maps a (latitude, longitude) pair to the local UTM zone so that
//! radius-in-meters buffering and distance computation are metrically
//! correct, and provides a reusable transformer between WGS84 geographic
//! coordinates and that zone's projected coordinates.
//!
//! Transforms use `proj4rs` (pure Rust). The UTM zone is expressed as an
//! explicit transverse Mercator proj string rather than an EPSG lookup,
//! so no external projection database is needed.

use geo::{Coord, LineString, Polygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use thiserror::Error;

/// Northern-hemisphere UTM EPSG base code (32601-32660 = zones 1-60 N).
const EPSG_UTM_NORTH_BASE: u32 = 32600;

/// Southern-hemisphere UTM EPSG base code (32701-32760 = zones 1-60 S).
const EPSG_UTM_SOUTH_BASE: u32 = 32700;

/// Vertex count used when tessellating a planar circle buffer.
///
/// An inscribed 64-gon underestimates the true disk area by about
/// 0.16% of `πr²`, which is well inside the error already accepted by
/// computing area ratios in unprojected geographic coordinates.
pub const CIRCLE_SEGMENTS: usize = 64;

/// Errors from projection operations.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Latitude or longitude outside the valid WGS84 ranges.
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// The offending latitude.
        latitude: f64,
        /// The offending longitude.
        longitude: f64,
    },

    /// Projection construction or point transform failed.
    #[error("Projection error: {message}")]
    Proj {
        /// Description of the failure.
        message: String,
    },
}

/// Resolves the EPSG code of the UTM zone containing a point.
///
/// The earth is partitioned into 60 longitude bands of 6 degrees each,
/// numbered from 1 at -180. Longitude 180 is clamped into zone 60
/// rather than wrapping to a nonexistent zone 61. Northern-hemisphere
/// points (lat >= 0) map into EPSG 32601-32660, southern into
/// 32701-32760.
///
/// # Errors
///
/// Returns [`ProjectionError::InvalidCoordinate`] if `lat` is outside
/// [-90, 90] or `lon` is outside [-180, 180].
pub fn resolve_utm_epsg(lat: f64, lon: f64) -> Result<u32, ProjectionError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) || lat.is_nan() {
        return Err(ProjectionError::InvalidCoordinate {
            latitude: lat,
            longitude: lon,
        });
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let zone = (((lon + 180.0) / 6.0).floor() as u32 + 1).min(60);

    let base = if lat >= 0.0 {
        EPSG_UTM_NORTH_BASE
    } else {
        EPSG_UTM_SOUTH_BASE
    };

    Ok(base + zone)
}

/// A reusable WGS84 <-> UTM transform pair for one UTM zone.
///
/// Construct once per query point and reuse for the center, the circle,
/// and every candidate geometry. Never cache across points in different
/// locations: the zone is a function of the point.
pub struct UtmTransformer {
    wgs84: Proj,
    utm: Proj,
    epsg: u32,
}

impl std::fmt::Debug for UtmTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtmTransformer")
            .field("epsg", &self.epsg)
            .finish_non_exhaustive()
    }
}

impl UtmTransformer {
    /// Builds a transformer for a UTM EPSG code (326xx or 327xx).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Proj`] if the code is not a UTM zone
    /// code or projection construction fails.
    pub fn for_epsg(epsg: u32) -> Result<Self, ProjectionError> {
        let (zone, south) = match epsg {
            e if (EPSG_UTM_NORTH_BASE + 1..=EPSG_UTM_NORTH_BASE + 60).contains(&e) => {
                (e - EPSG_UTM_NORTH_BASE, false)
            }
            e if (EPSG_UTM_SOUTH_BASE + 1..=EPSG_UTM_SOUTH_BASE + 60).contains(&e) => {
                (e - EPSG_UTM_SOUTH_BASE, true)
            }
            e => {
                return Err(ProjectionError::Proj {
                    message: format!("EPSG:{e} is not a UTM zone code"),
                });
            }
        };

        // The UTM zone definition spelled out as transverse Mercator:
        // central meridian at zone*6 - 183, scale 0.9996, 500km false
        // easting, 10,000km false northing south of the equator.
        let central_meridian = i64::from(zone) * 6 - 183;
        let false_northing = if south { 10_000_000 } else { 0 };
        let utm_str = format!(
            "+proj=tmerc +lat_0=0 +lon_0={central_meridian} +k=0.9996 \
             +x_0=500000 +y_0={false_northing} +ellps=WGS84 +units=m +no_defs"
        );

        let wgs84 = Proj::from_proj_string("+proj=longlat +datum=WGS84 +no_defs").map_err(|e| {
            ProjectionError::Proj {
                message: format!("Failed to build WGS84 projection: {e:?}"),
            }
        })?;
        let utm = Proj::from_proj_string(&utm_str).map_err(|e| ProjectionError::Proj {
            message: format!("Failed to build UTM projection for EPSG:{epsg}: {e:?}"),
        })?;

        Ok(Self { wgs84, utm, epsg })
    }

    /// Builds the transformer for the zone containing a point.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] for out-of-range coordinates or
    /// projection construction failure.
    pub fn for_point(lat: f64, lon: f64) -> Result<Self, ProjectionError> {
        Self::for_epsg(resolve_utm_epsg(lat, lon)?)
    }

    /// The UTM EPSG code this transformer targets.
    #[must_use]
    pub const fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Projects a WGS84 (lon, lat) degree pair to UTM meters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Proj`] if the transform fails.
    pub fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        // proj4rs works in radians on the geographic side
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.wgs84, &self.utm, &mut point).map_err(|e| ProjectionError::Proj {
            message: format!("WGS84 -> EPSG:{} transform failed: {e:?}", self.epsg),
        })?;
        Ok((point.0, point.1))
    }

    /// Unprojects UTM meters back to a WGS84 (lon, lat) degree pair.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Proj`] if the transform fails.
    pub fn unproject(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let mut point = (x, y, 0.0);
        transform(&self.utm, &self.wgs84, &mut point).map_err(|e| ProjectionError::Proj {
            message: format!("EPSG:{} -> WGS84 transform failed: {e:?}", self.epsg),
        })?;
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }

    /// Unprojects a UTM-space polygon back to WGS84 degrees.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Proj`] if any vertex transform fails.
    pub fn unproject_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>, ProjectionError> {
        let exterior = self.unproject_ring(polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| self.unproject_ring(ring))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn unproject_ring(&self, ring: &LineString<f64>) -> Result<LineString<f64>, ProjectionError> {
        let coords = ring
            .coords()
            .map(|c| self.unproject(c.x, c.y).map(|(x, y)| Coord { x, y }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LineString::from(coords))
    }
}

/// Tessellates a planar circle of `radius` meters around `center` (in
/// projected coordinates) into a closed polygon with
/// [`CIRCLE_SEGMENTS`] vertices.
#[must_use]
pub fn circle_polygon(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    #[allow(clippy::cast_precision_loss)]
    let step = std::f64::consts::TAU / CIRCLE_SEGMENTS as f64;

    let mut coords = Vec::with_capacity(CIRCLE_SEGMENTS + 1);
    for i in 0..CIRCLE_SEGMENTS {
        #[allow(clippy::cast_precision_loss)]
        let angle = step * i as f64;
        coords.push(Coord {
            x: radius.mul_add(angle.cos(), center.x),
            y: radius.mul_add(angle.sin(), center.y),
        });
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}
