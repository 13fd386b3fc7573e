use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Mean equatorial radius used by the feed's reference distance calculation.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Haversine great-circle distance between two points in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1_r = a.lat.to_radians();
    let lat2_r = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

// --- Feed Types ---

/// One raw row from the detection feed: column name → cell text.
pub type FeedRecord = BTreeMap<String, String>;

pub const LATITUDE_FIELD: &str = "latitude";
pub const LONGITUDE_FIELD: &str = "longitude";
pub const ACQ_DATE_FIELD: &str = "acq_date";

/// A parsed feed detection that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub latitude: f64,
    pub longitude: f64,
    pub acq_date: NaiveDate,
    /// Remaining feed columns (brightness, confidence, satellite, ...), untouched.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Detection {
    /// Parse a raw feed row. Coordinates must be finite and in range.
    pub fn from_record(record: &FeedRecord) -> Result<Self, RecordError> {
        let latitude = parse_coordinate(record, LATITUDE_FIELD, 90.0)?;
        let longitude = parse_coordinate(record, LONGITUDE_FIELD, 180.0)?;

        let raw_date = required_field(record, ACQ_DATE_FIELD)?;
        let acq_date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            RecordError::Invalid {
                field: ACQ_DATE_FIELD,
                value: raw_date.to_string(),
            }
        })?;

        let attributes = record
            .iter()
            .filter(|(k, _)| {
                !matches!(k.as_str(), LATITUDE_FIELD | LONGITUDE_FIELD | ACQ_DATE_FIELD)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            latitude,
            longitude,
            acq_date,
            attributes,
        })
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

fn required_field<'a>(record: &'a FeedRecord, field: &'static str) -> Result<&'a str, RecordError> {
    record
        .get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(RecordError::Missing(field))
}

fn parse_coordinate(record: &FeedRecord, field: &'static str, bound: f64) -> Result<f64, RecordError> {
    let raw = required_field(record, field)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= bound)
        .ok_or_else(|| RecordError::Invalid {
            field,
            value: raw.to_string(),
        })
}

// --- Persisted Types ---

pub type EventId = Uuid;

/// A detection after it has been committed to the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    pub id: EventId,
    #[serde(flatten)]
    pub detection: Detection,
    pub recorded_at: DateTime<Utc>,
}

impl FireEvent {
    pub fn new(id: EventId, detection: Detection, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            detection,
            recorded_at,
        }
    }

    pub fn point(&self) -> GeoPoint {
        self.detection.point()
    }
}

/// A notification recipient. Read-only to the pipeline except for token removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub location: Option<GeoPoint>,
    pub push_token: Option<String>,
}
