//! Call record to point feature conversion.

use wake_dispatch_models::{
    CallRecord, Coordinate, FeatureProperties, FeatureType, Geometry, PointFeature,
};

/// Builds the stored feature for a resolved call.
///
/// Only the fixed property set (`place, time, title, type_long, type,
/// updated, url, who`) is carried over; the map link and any other record
/// fields are dropped. Elevation is always zero.
#[must_use]
pub fn to_feature(record: &CallRecord, coordinate: Coordinate) -> PointFeature {
    PointFeature {
        kind: FeatureType::Feature,
        id: record.id.clone(),
        geometry: Geometry::point(coordinate),
        properties: FeatureProperties {
            place: record.place.clone(),
            time: record.time,
            title: record.title.clone(),
            type_long: record.incident_type.type_long.clone(),
            type_code: record.incident_type.code.clone(),
            updated: record.updated,
            url: record.url.clone(),
            who: record.who.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use wake_dispatch_models::{FEATURE_PROPERTY_KEYS, IncidentType};

    use super::*;

    fn record() -> CallRecord {
        CallRecord {
            id: "845".to_string(),
            url: "https://twitter.com/WakeDispatch/status/845".to_string(),
            time: 1_490_547_660_000,
            updated: 1_490_547_660_000,
            who: "RFE22".to_string(),
            place: "9600 Falls of Neuse Rd, RA ".to_string(),
            map_url: "https://t.co/x".to_string(),
            coordinate: Some(Coordinate {
                lat: 35.7,
                lon: -78.6,
            }),
            title: "Cardiac (FHEART) - 9600 Falls of Neuse Rd, RA ".to_string(),
            incident_type: IncidentType {
                type_long: "Cardiac".to_string(),
                code: "FHEART".to_string(),
            },
        }
    }

    #[test]
    fn emits_longitude_first_with_zero_elevation() {
        let feature = to_feature(
            &record(),
            Coordinate {
                lat: 35.7,
                lon: -78.6,
            },
        );
        assert_eq!(feature.geometry.coordinates, vec![-78.6, 35.7, 0.0]);
        assert_eq!(feature.id, "845");
    }

    #[test]
    fn copies_only_allowlisted_properties() {
        let feature = to_feature(
            &record(),
            Coordinate {
                lat: 35.7,
                lon: -78.6,
            },
        );
        let json = serde_json::to_value(&feature).unwrap();

        let properties = json["properties"].as_object().unwrap();
        assert_eq!(properties.len(), FEATURE_PROPERTY_KEYS.len());
        for key in FEATURE_PROPERTY_KEYS {
            assert!(properties.contains_key(key), "missing {key}");
        }
        assert!(!json.to_string().contains("t.co"));
        assert_eq!(properties["type"], "FHEART");
        assert_eq!(properties["type_long"], "Cardiac");
    }
}
