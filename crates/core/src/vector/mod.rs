//! Vector data: fire-perimeter records and the region of interest
//!
//! Fire records arrive with free-text start/end fields. A record is only
//! usable for scoring when both fields carry a time separator and parse
//! under [`FIRE_DATE_FORMAT`]; otherwise its footprint is masked out.

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::Intersects;
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Date format of fire record fields (`yyyy-MM-dd HH:mm:ss.SSS`, UTC)
pub const FIRE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Token a date field must contain to be considered a timestamp
pub const TIME_SEPARATOR: char = ':';

/// Parse one fire record date field.
///
/// The field must contain [`TIME_SEPARATOR`] and match [`FIRE_DATE_FORMAT`].
pub fn parse_fire_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    let invalid = || Error::InvalidDateRecord {
        field,
        value: value.to_string(),
    };
    if !value.contains(TIME_SEPARATOR) {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(value.trim(), FIRE_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid())
}

/// GeoJSON-style polygonal geometry as found in fire perimeter files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometrySpec {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

impl GeometrySpec {
    /// Convert to a `geo` geometry
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            GeometrySpec::Polygon(rings) => Geometry::Polygon(polygon_from_rings(rings)),
            GeometrySpec::MultiPolygon(polys) => Geometry::MultiPolygon(MultiPolygon::new(
                polys.iter().map(|rings| polygon_from_rings(rings)).collect(),
            )),
        }
    }
}

fn polygon_from_rings(rings: &[Vec<[f64; 2]>]) -> Polygon<f64> {
    let mut lines = rings.iter().map(|ring| {
        LineString::new(ring.iter().map(|&[x, y]| Coord { x, y }).collect())
    });
    let exterior = lines.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, lines.collect())
}

/// Serialized form of a fire record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FireRecordSpec {
    id: String,
    start: String,
    end: String,
    geometry: GeometrySpec,
}

/// A fire-perimeter record with unvalidated date fields
#[derive(Debug, Clone)]
pub struct FireRecord {
    /// Record identifier
    pub id: String,
    /// Raw start date text
    pub start: String,
    /// Raw end date text
    pub end: String,
    /// Burned-area perimeter
    pub geometry: Geometry<f64>,
}

impl FireRecord {
    /// Create a record from raw fields
    pub fn new(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        geometry: Geometry<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            start: start.into(),
            end: end.into(),
            geometry,
        }
    }

    /// Validate both date fields. Either field failing makes the whole
    /// record invalid.
    pub fn validate(&self) -> Result<DatedFire> {
        let start = parse_fire_timestamp("start", &self.start)?;
        let end = parse_fire_timestamp("end", &self.end)?;
        Ok(DatedFire {
            id: self.id.clone(),
            start,
            end,
            geometry: self.geometry.clone(),
        })
    }
}

/// A fire record whose dates parsed
#[derive(Debug, Clone)]
pub struct DatedFire {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub geometry: Geometry<f64>,
}

/// Read fire records from a JSON array of
/// `{"id", "start", "end", "geometry": {"type", "coordinates"}}` objects
pub fn read_fire_records<P: AsRef<Path>>(path: P) -> Result<Vec<FireRecord>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_fire_records(&text)
}

/// Parse fire records from JSON text
pub fn parse_fire_records(json: &str) -> Result<Vec<FireRecord>> {
    let specs: Vec<FireRecordSpec> = serde_json::from_str(json)?;
    Ok(specs
        .into_iter()
        .map(|s| FireRecord::new(s.id, s.start, s.end, s.geometry.to_geometry()))
        .collect())
}

/// Region of interest (the general fire area)
#[derive(Debug, Clone)]
pub struct Region {
    geometry: Geometry<f64>,
}

impl Region {
    /// Region from any polygonal geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self { geometry }
    }

    /// Region from a single polygon
    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self::new(Geometry::Polygon(polygon))
    }

    /// Axis-aligned rectangular region
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let ring = vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ];
        Self::from_polygon(Polygon::new(LineString::from(ring), vec![]))
    }

    /// Region geometry
    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    /// Whether a map location lies inside the region (boundary included)
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.intersects(&Point::new(x, y))
    }

    /// Whether a geometry touches the region
    pub fn intersects(&self, other: &Geometry<f64>) -> bool {
        self.geometry.intersects(other)
    }
}
