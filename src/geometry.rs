//! Geometry inputs of the metric stages: WKT parsing, study zones with
//! their representative points, and land-use classes.
//!
//! Coordinates are WGS84 longitude/latitude. Distances are great-circle:
//! kilometres along trajectories, metres between zones.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{Distance, Geometry, Haversine, InteriorPoint, Intersects, MultiPolygon, Point};
use serde::Deserialize;
use tracing::{info, warn};
use wkt::TryFromWkt;

use crate::error::{Error, Result};

pub fn parse_geometry_wkt(text: &str) -> Result<Geometry<f64>> {
    Geometry::try_from_wkt_str(text).map_err(|e| Error::Geometry(format!("{e}: {text}")))
}

pub fn parse_point_wkt(text: &str) -> Result<Point<f64>> {
    match parse_geometry_wkt(text)? {
        Geometry::Point(p) => Ok(p),
        other => Err(Error::Geometry(format!(
            "expected a POINT, got {}",
            geometry_kind(&other)
        ))),
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine::distance(a, b) / 1000.0
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) => "LINE",
        Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        Geometry::Rect(_) => "RECT",
        Geometry::Triangle(_) => "TRIANGLE",
    }
}

#[derive(Debug, Deserialize)]
struct ZoneRow {
    cod: u32,
    wkt: String,
}

/// Study zones keyed by their 1-based code. Each zone is reduced to a point
/// guaranteed to lie inside it.
#[derive(Debug, Clone, Default)]
pub struct Zones {
    points: BTreeMap<u32, Point<f64>>,
}

impl Zones {
    /// Reads a CSV with `cod` and `wkt` columns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let mut zones = Vec::new();
        for row in reader.deserialize() {
            let row: ZoneRow = row?;
            zones.push((row.cod, parse_geometry_wkt(&row.wkt)?));
        }
        let zones = Self::from_geometries(zones)?;
        info!(path = %path.display(), zones = zones.len(), "Zones loaded");
        Ok(zones)
    }

    pub fn from_geometries(zones: impl IntoIterator<Item = (u32, Geometry<f64>)>) -> Result<Self> {
        let mut points = BTreeMap::new();
        for (code, geometry) in zones {
            if code == 0 {
                return Err(Error::Geometry("zone codes start at 1".to_string()));
            }
            let point = geometry
                .interior_point()
                .ok_or_else(|| Error::Geometry(format!("zone {code} has an empty geometry")))?;
            points.insert(code, point);
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Highest zone code.
    pub fn max_code(&self) -> u32 {
        self.points.keys().next_back().copied().unwrap_or(0)
    }

    pub fn point(&self, code: u32) -> Option<Point<f64>> {
        self.points.get(&code).copied()
    }

    /// Distance in metres between two zones' representative points.
    pub fn distance_m(&self, from: u32, to: u32) -> Option<f64> {
        Some(Haversine::distance(self.point(from)?, self.point(to)?))
    }
}

#[derive(Debug, Deserialize)]
struct LandUseRow {
    lu_transl: String,
    wkt: String,
}

/// Land-use polygons merged per class, classes in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct LandUse {
    classes: Vec<(String, MultiPolygon<f64>)>,
}

impl LandUse {
    /// Reads a CSV with `lu_transl` and `wkt` columns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: LandUseRow = row?;
            rows.push((row.lu_transl, parse_geometry_wkt(&row.wkt)?));
        }
        let land_use = Self::from_geometries(rows);
        info!(path = %path.display(), classes = land_use.classes.len(), "Land use loaded");
        Ok(land_use)
    }

    pub fn from_geometries(rows: impl IntoIterator<Item = (String, Geometry<f64>)>) -> Self {
        let mut classes: Vec<(String, MultiPolygon<f64>)> = Vec::new();
        for (class, geometry) in rows {
            let polygons = match geometry {
                Geometry::Polygon(p) => vec![p],
                Geometry::MultiPolygon(mp) => mp.0,
                other => {
                    warn!(class = %class, kind = geometry_kind(&other), "Skipping non-areal land use geometry");
                    continue;
                }
            };
            match classes.iter_mut().find(|(name, _)| *name == class) {
                Some((_, merged)) => merged.0.extend(polygons),
                None => classes.push((class, MultiPolygon(polygons))),
            }
        }
        Self { classes }
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|(name, _)| name.as_str())
    }

    /// Number of `points` touching each class, in class order.
    pub fn count_points(&self, points: &[Point<f64>]) -> Vec<(&str, usize)> {
        self.classes
            .iter()
            .map(|(name, area)| {
                let n = points.iter().filter(|p| area.intersects(*p)).count();
                (name.as_str(), n)
            })
            .collect()
    }
}
