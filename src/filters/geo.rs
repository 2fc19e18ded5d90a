//! Geo and place-type predicates.
//!
//! Filters that only restrict by place type let records without a geo
//! annotation through; only [`filter_geo`], [`only_pois`] and
//! [`only_neighborhoods`] require one.

use tracing::warn;

use super::Partition;
use crate::records::{PlaceType, Record};

/// Keeps records that carry a geo annotation.
pub fn filter_geo(records: &[Record]) -> Partition {
    Partition::split(records, |r| r.geo.is_some())
}

/// Drops records located by exact coordinates.
pub fn filter_coordinates(records: &[Record]) -> Partition {
    Partition::split(records, |r| !r.has_coordinates())
}

/// Drops geo records that have no place type, coordinate records included.
pub fn filter_no_place_type(records: &[Record]) -> Partition {
    Partition::split(records, |r| match &r.geo {
        Some(geo) => geo.place_type.is_some(),
        None => true,
    })
}

/// Drops records placed in a city.
pub fn filter_cities(records: &[Record]) -> Partition {
    drop_place_types(records, &[PlaceType::City])
}

/// Drops records placed in a city, an admin region or a country.
pub fn filter_cities_and_bigger(records: &[Record]) -> Partition {
    drop_place_types(records, &[PlaceType::City, PlaceType::Country, PlaceType::Admin])
}

/// Keeps only records placed at a point of interest.
pub fn only_pois(records: &[Record]) -> Partition {
    only_place_type(records, PlaceType::Poi)
}

/// Keeps only records placed in a neighborhood.
pub fn only_neighborhoods(records: &[Record]) -> Partition {
    only_place_type(records, PlaceType::Neighborhood)
}

fn drop_place_types(records: &[Record], types: &[PlaceType]) -> Partition {
    Partition::split(records, |r| {
        if r.has_coordinates() {
            return true;
        }
        !r.place_type().is_some_and(|t| types.contains(&t))
    })
}

fn only_place_type(records: &[Record], place_type: PlaceType) -> Partition {
    Partition::split(records, |r| {
        let Some(geo) = &r.geo else {
            return false;
        };
        if geo.coordinates.is_some() {
            return false;
        }
        match geo.place_type {
            Some(t) => t == place_type,
            None => {
                warn!(record_id = %r.id, "No place type specified");
                false
            }
        }
    })
}
