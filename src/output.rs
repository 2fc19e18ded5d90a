//! Persistence for record collections.
//!
//! Raw dumps are JSON, gzip-compressed when the path ends in `.gz`. Cleaned
//! records go to a `;`-separated CSV; places and located records can be
//! exported with WKT geometry for GIS tools.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::WriterBuilder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use geo::Point;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use wkt::ToWkt;

use crate::error::Result;
use crate::places::{Place, bbox_centroid, bbox_polygon};
use crate::records::{Record, RecordRow};

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Serializes `value` as JSON to `path`.
pub fn save_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut file = BufWriter::new(File::create(path)?);

    if is_gzip(path) {
        let mut encoder = GzEncoder::new(&mut file, Compression::default());
        serde_json::to_writer(&mut encoder, value)?;
        encoder.finish()?;
    } else {
        serde_json::to_writer(&mut file, value)?;
    }
    file.flush()?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(serde_json::from_reader(reader)?)
}

/// Writes records without loss so a later run can reload them.
pub fn save_records_raw(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
    save_json(path.as_ref(), records)?;
    info!(path = %path.as_ref().display(), records = records.len(), "Records saved");
    Ok(())
}

pub fn load_records_raw(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let records: Vec<Record> = load_json(path.as_ref())?;
    info!(path = %path.as_ref().display(), records = records.len(), "Records loaded");
    Ok(records)
}

/// Writes the tabular projection as a `;`-separated CSV with headers.
pub fn write_records_csv(path: impl AsRef<Path>, rows: &[RecordRow]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Record table written");
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlaceWktRow<'a> {
    id: &'a str,
    name: Option<&'a str>,
    full_name: Option<&'a str>,
    place_type: Option<&'static str>,
    wkt: String,
}

/// Writes one row per place with its bounding box as a WKT polygon. Places
/// without a bounding box are skipped.
pub fn write_places_wkt(path: impl AsRef<Path>, places: &[Place]) -> Result<usize> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    let mut written = 0;
    for place in places {
        let Some(bbox) = place.bbox() else {
            continue;
        };
        writer.serialize(PlaceWktRow {
            id: &place.id,
            name: place.name.as_deref(),
            full_name: place.full_name.as_deref(),
            place_type: place.place_type.map(|t| t.as_str()),
            wkt: bbox_polygon(bbox).wkt_string(),
        })?;
        written += 1;
    }
    writer.flush()?;
    info!(path = %path.display(), written, skipped = places.len() - written, "Places exported");
    Ok(written)
}

#[derive(Debug, Serialize)]
struct RecordWktRow<'a> {
    #[serde(rename = "Tweet_ID")]
    id: &'a str,
    #[serde(rename = "User_ID")]
    user_id: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    wkt: String,
}

/// Writes located records as points: exact coordinates when present,
/// otherwise the centre of the place's bounding box.
pub fn write_records_wkt(path: impl AsRef<Path>, records: &[Record]) -> Result<usize> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    let mut written = 0;
    for record in records {
        let Some(geo) = &record.geo else {
            continue;
        };
        let point = match (&geo.coordinates, geo.bbox) {
            (Some(c), _) => Point::new(c.coordinates[0], c.coordinates[1]),
            (None, Some(bbox)) => bbox_centroid(bbox),
            (None, None) => continue,
        };
        writer.serialize(RecordWktRow {
            id: &record.id,
            user_id: &record.author.id,
            timestamp: record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            wkt: point.wkt_string(),
        })?;
        written += 1;
    }
    writer.flush()?;
    info!(path = %path.display(), written, "Located records exported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::extract_places;
    use crate::records::fixtures::*;
    use crate::records::{PlaceType, to_rows};

    #[test]
    fn test_raw_roundtrip_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            with_place(record("1", "a", "x"), "p1", PlaceType::Poi),
            record("2", "b", "y"),
        ];

        for name in ["dump.json", "dump.json.gz"] {
            let path = dir.path().join(name);
            save_records_raw(&path, &records).unwrap();
            assert_eq!(load_records_raw(&path).unwrap(), records);
        }

        let gz = fs::read(dir.path().join("dump.json.gz")).unwrap();
        assert_eq!(&gz[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_records_csv_uses_semicolons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/clean.csv");
        let rows = to_rows(&[record("1", "a", "Tom &amp; Jerry, again")]);

        write_records_csv(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("Text;Id_Tweet;Id_User"));
        assert!(lines.next().unwrap().starts_with("Tom & Jerry, again;1;a;user_a"));
    }

    #[test]
    fn test_wkt_exports() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            with_place(record("1", "a", "x"), "p1", PlaceType::Poi),
            with_coordinates(record("2", "b", "y"), 13.0, 47.8),
            record("3", "c", "z"),
        ];
        let (_, places) = extract_places(&records);

        let places_path = dir.path().join("places.csv");
        assert_eq!(write_places_wkt(&places_path, &places).unwrap(), 1);
        let content = fs::read_to_string(&places_path).unwrap();
        assert!(content.contains("POLYGON"));

        let records_path = dir.path().join("records.csv");
        assert_eq!(write_records_wkt(&records_path, &records).unwrap(), 2);
        let content = fs::read_to_string(&records_path).unwrap();
        assert!(content.contains("POINT"));
        assert!(content.contains("47.8"));
    }
}
