#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the wake-dispatch pipeline.
//!
//! Three families of types live here:
//!
//! * feed-side types ([`RawMessage`], [`IncidentFields`]) produced before
//!   any parsing decisions are made,
//! * the canonical [`CallRecord`] produced by the parser and enriched by the
//!   coordinate resolver,
//! * the `GeoJSON`-shaped output types ([`PointFeature`],
//!   [`FeatureCollection`], [`BoundingBox`]) that are stored and served.

use serde::{Deserialize, Serialize};

/// A single message as delivered by the feed, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message identifier assigned by the feed.
    pub id: String,
    /// Handle of the account that published the message.
    pub handle: String,
    /// The message text.
    pub text: String,
    /// Arrival time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl RawMessage {
    /// Creates a new raw message.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        text: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            text: text.into(),
            timestamp_ms,
        }
    }

    /// Public permalink for this message.
    #[must_use]
    pub fn permalink(&self) -> String {
        format!("https://twitter.com/{}/status/{}", self.handle, self.id)
    }
}

/// The labeled fields extracted from a dispatch message, whitespace-trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFields {
    /// Dispatch date and time as written by the upstream system (`03/26 13:01`).
    pub datetime: String,
    /// Address text, usually followed by a shortened map link.
    pub address: String,
    /// Incident type text (`Cardiac (FHEART)`).
    pub type_raw: String,
    /// Responding unit (`RFE22`).
    pub who: String,
}

/// Incident type split into its long description and short code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentType {
    /// Long description (`Cardiac`).
    pub type_long: String,
    /// Short dispatch code (`FHEART`).
    #[serde(rename = "type")]
    pub code: String,
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// The canonical structured incident.
///
/// Produced by the parser with `coordinate` unset, then completed by the
/// coordinate resolver before conversion to a [`PointFeature`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Record identifier (the feed message id).
    pub id: String,
    /// Permalink to the source message.
    pub url: String,
    /// When the incident was received, epoch milliseconds.
    pub time: i64,
    /// When the record was last updated, epoch milliseconds.
    pub updated: i64,
    /// Responding unit.
    pub who: String,
    /// Place text, verbatim from the address field up to the map link.
    pub place: String,
    /// Shortened map link from the address field. A record is only built
    /// when the address carries one.
    pub map_url: String,
    /// Resolved coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    /// `"<type_long> (<type>) - <place>"`.
    pub title: String,
    /// Refined incident type.
    #[serde(flatten)]
    pub incident_type: IncidentType,
}

/// The property names a [`PointFeature`] carries, in output order.
pub const FEATURE_PROPERTY_KEYS: [&str; 8] = [
    "place",
    "time",
    "title",
    "type_long",
    "type",
    "updated",
    "url",
    "who",
];

/// Properties of a [`PointFeature`]. Exactly the keys in
/// [`FEATURE_PROPERTY_KEYS`]; anything else is dropped on deserialization.
///
/// Text properties missing from a stored document read back as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default)]
    pub place: String,
    pub time: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub type_long: String,
    #[serde(rename = "type", default)]
    pub type_code: String,
    pub updated: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub who: String,
}

/// `GeoJSON` `"Feature"` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Feature,
}

/// `GeoJSON` `"Point"` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    #[default]
    Point,
}

/// `GeoJSON` `"FeatureCollection"` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureCollectionType {
    #[default]
    FeatureCollection,
}

/// Point geometry. Coordinates are longitude first: `[lon, lat, elevation]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    pub coordinates: Vec<f64>,
}

impl Geometry {
    /// Creates a point at `coordinate` with zero elevation.
    #[must_use]
    pub fn point(coordinate: Coordinate) -> Self {
        Self {
            kind: GeometryType::Point,
            coordinates: vec![coordinate.lon, coordinate.lat, 0.0],
        }
    }

    /// Returns `[lon, lat, elevation]`, with elevation defaulting to zero.
    ///
    /// Returns `None` if fewer than two coordinates are present.
    #[must_use]
    pub fn position(&self) -> Option<[f64; 3]> {
        match self.coordinates.as_slice() {
            [lon, lat] => Some([*lon, *lat, 0.0]),
            [lon, lat, elev, ..] => Some([*lon, *lat, *elev]),
            _ => None,
        }
    }
}

/// A `GeoJSON` point feature for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub id: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

/// A 3-D axis-aligned bounding box.
///
/// Serialized as the six-element array
/// `[min_lon, min_lat, min_elev, max_lon, max_lat, max_elev]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BoundingBox {
    /// `[min_lon, min_lat, min_elev]`.
    pub min: [f64; 3],
    /// `[max_lon, max_lat, max_elev]`.
    pub max: [f64; 3],
}

impl BoundingBox {
    /// A degenerate box containing exactly `position`.
    #[must_use]
    pub const fn from_position(position: [f64; 3]) -> Self {
        Self {
            min: position,
            max: position,
        }
    }

    /// Grows the box to contain `position`.
    pub fn extend(&mut self, position: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(position[axis]);
            self.max[axis] = self.max[axis].max(position[axis]);
        }
    }

    /// The box as its six-element array form.
    #[must_use]
    pub const fn to_array(&self) -> [f64; 6] {
        [
            self.min[0],
            self.min[1],
            self.min[2],
            self.max[0],
            self.max[1],
            self.max[2],
        ]
    }
}

/// Error returned when a bounding box array is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBoundingBoxError {
    /// Number of values that were provided.
    pub len: usize,
}

impl std::fmt::Display for InvalidBoundingBoxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid bounding box: expected 6 values, got {}",
            self.len
        )
    }
}

impl std::error::Error for InvalidBoundingBoxError {}

impl TryFrom<Vec<f64>> for BoundingBox {
    type Error = InvalidBoundingBoxError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [a, b, c, d, e, f] => Ok(Self {
                min: [*a, *b, *c],
                max: [*d, *e, *f],
            }),
            _ => Err(InvalidBoundingBoxError { len: values.len() }),
        }
    }
}

impl From<BoundingBox> for Vec<f64> {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array().to_vec()
    }
}

/// Response metadata attached to a [`FeatureCollection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Full URL of the request that produced the collection.
    pub url: String,
    /// Human-readable description of the collection.
    pub title: String,
    /// Version of the API that produced the collection.
    pub api_version: String,
    /// Number of features.
    pub count: usize,
    /// HTTP status returned with the collection.
    pub status: u16,
    /// Explanation attached to error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A `GeoJSON` feature collection with response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: FeatureCollectionType,
    pub metadata: CollectionMetadata,
    pub features: Vec<PointFeature>,
    /// Bounds of all features; serialized as `[]` when there are none.
    #[serde(default, with = "bbox_or_empty")]
    pub bbox: Option<BoundingBox>,
}

mod bbox_or_empty {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::BoundingBox;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        bbox: &Option<BoundingBox>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bbox {
            Some(bbox) => bbox.serialize(serializer),
            None => Vec::<f64>::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BoundingBox>, D::Error> {
        let values = Vec::<f64>::deserialize(deserializer)?;
        if values.is_empty() {
            return Ok(None);
        }
        BoundingBox::try_from(values)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// One row returned by a time-window query against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Document id.
    #[serde(default)]
    pub id: Option<String>,
    /// Index key the row was selected by (the feature's `time`).
    #[serde(default)]
    pub key: serde_json::Value,
    /// The stored feature. Store bookkeeping fields (`_id`, `_rev`) are
    /// ignored when deserializing.
    pub value: PointFeature,
}

/// Options for a time-ordered store query.
///
/// Keys are feature `time` values. With `descending` set, rows run newest
/// first and `endkey` is the oldest time included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOptions {
    pub descending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endkey: Option<i64>,
}
