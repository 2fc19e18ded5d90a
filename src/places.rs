//! Places attached to posts: extraction into a de-duplicated collection,
//! place-type filters and bounding-box geometry.

use std::collections::HashSet;

use geo::{Point, Polygon, polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::records::{Geo, PlaceType, Record};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceGeometry {
    /// `[west, south, east, north]`
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

/// A named geographic entity as expanded by the search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub place_type: Option<PlaceType>,
    #[serde(default)]
    pub geo: Option<PlaceGeometry>,
}

impl Place {
    pub fn bbox(&self) -> Option<[f64; 4]> {
        self.geo.as_ref().and_then(|g| g.bbox)
    }

    /// Geo annotation of a post located at this place.
    pub fn to_geo(&self) -> Geo {
        Geo {
            place_id: Some(self.id.clone()),
            coordinates: None,
            place_type: self.place_type,
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            bbox: self.bbox(),
        }
    }

    fn from_geo(id: &str, geo: &Geo) -> Self {
        Place {
            id: id.to_string(),
            name: geo.name.clone(),
            full_name: geo.full_name.clone(),
            place_type: geo.place_type,
            geo: Some(PlaceGeometry { bbox: geo.bbox }),
        }
    }
}

/// Moves attached places out of the records.
///
/// Every distinct place is returned once, in first-seen order, and each
/// record that carried it keeps only the place id. Coordinate annotations
/// and bare id references are left untouched.
pub fn extract_places(records: &[Record]) -> (Vec<Record>, Vec<Place>) {
    let mut seen = HashSet::new();
    let mut places = Vec::new();

    let stripped = records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            let Some(geo) = record.geo.as_ref() else {
                return record;
            };
            if geo.coordinates.is_some() || geo.is_reference_only() {
                return record;
            }
            let Some(id) = geo.place_id.clone() else {
                return record;
            };

            if seen.insert(id.clone()) {
                places.push(Place::from_geo(&id, geo));
            }
            record.geo = Some(Geo {
                place_id: Some(id),
                ..Default::default()
            });
            record
        })
        .collect();

    info!(
        records = records.len(),
        places = places.len(),
        "Extracted places from records"
    );
    (stripped, places)
}

/// Re-attaches extracted places to records that only hold a place id.
/// Records referencing an unknown place stay geo-incomplete.
pub fn attach_places(records: &[Record], places: &[Place]) -> Vec<Record> {
    records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            let place = record
                .geo
                .as_ref()
                .filter(|g| g.is_reference_only())
                .and_then(|g| g.place_id.as_ref())
                .and_then(|id| places.iter().find(|p| &p.id == id));
            if let Some(place) = place {
                record.geo = Some(place.to_geo());
            }
            record
        })
        .collect()
}

/// Bounding box `[w, s, e, n]` as a closed polygon.
pub fn bbox_polygon(bbox: [f64; 4]) -> Polygon<f64> {
    let [w, s, e, n] = bbox;
    polygon![
        (x: w, y: s),
        (x: e, y: s),
        (x: e, y: n),
        (x: w, y: n),
    ]
}

/// Mean of the four bounding-box corners.
pub fn bbox_centroid(bbox: [f64; 4]) -> Point<f64> {
    let [w, s, e, n] = bbox;
    Point::new((w + e + e + w) / 4.0, (s + s + n + n) / 4.0)
}

/// Place-type filters over an extracted place collection.
pub struct PlaceAnalyzer {
    original: Vec<Place>,
    places: Vec<Place>,
}

/// Which place filters [`PlaceAnalyzer::use_filters`] applies.
#[derive(Debug, Clone, Copy)]
pub struct PlaceFilterOptions {
    pub cities: bool,
    pub cities_or_bigger: bool,
    pub neighborhoods: bool,
    pub pois: bool,
}

impl Default for PlaceFilterOptions {
    fn default() -> Self {
        Self {
            cities: true,
            cities_or_bigger: true,
            neighborhoods: false,
            pois: false,
        }
    }
}

impl PlaceAnalyzer {
    pub fn new(places: Vec<Place>) -> Self {
        Self {
            original: places.clone(),
            places,
        }
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn reset(&mut self) {
        self.places = self.original.clone();
    }

    pub fn use_filters(&mut self, options: PlaceFilterOptions) -> &[Place] {
        if options.cities_or_bigger {
            self.drop_types(&[PlaceType::City, PlaceType::Country, PlaceType::Admin]);
        }
        if options.cities && !options.cities_or_bigger {
            self.drop_types(&[PlaceType::City]);
        }
        if options.pois {
            self.keep_only(PlaceType::Poi);
        }
        if options.neighborhoods {
            self.keep_only(PlaceType::Neighborhood);
        }
        &self.places
    }

    /// Removes places whose type is one of `types`.
    pub fn drop_types(&mut self, types: &[PlaceType]) {
        let before = self.places.len();
        self.places
            .retain(|p| !p.place_type.is_some_and(|t| types.contains(&t)));
        debug!(
            removed = before - self.places.len(),
            ?types,
            "Dropped places by type"
        );
    }

    /// Keeps only places of type `place_type`.
    pub fn keep_only(&mut self, place_type: PlaceType) {
        let before = self.places.len();
        self.places.retain(|p| p.place_type == Some(place_type));
        debug!(
            removed = before - self.places.len(),
            kept = self.places.len(),
            place_type = place_type.as_str(),
            "Kept places of one type"
        );
    }
}
