#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parser for Wake County dispatch messages.
//!
//! Dispatch messages are `" / "`-delimited with a fixed field order:
//!
//! ```text
//! 03/26 13:01 / 9600 Falls of Neuse Rd, RA https://t.co/afz1yPj1vV / Cardiac (FHEART) / T17 / 028V / RFE22
//! datetime      address + map link                                  incident type     (reserved)   responder
//! ```
//!
//! [`tokenize`] maps segments onto labeled [`IncidentFields`], and [`parse`]
//! refines those into a [`CallRecord`] whose coordinate is still unresolved.

use std::sync::LazyLock;

use regex::Regex;
use wake_dispatch_models::{CallRecord, IncidentFields, IncidentType, RawMessage};

/// Separator between message segments.
pub const SEPARATOR: &str = " / ";

/// Marker that starts the map link inside the address segment.
const MAP_LINK_MARKER: &str = "https";

/// `"<long description> (<short code>)"`.
static INCIDENT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<long>.*) \((?P<code>.*)\)").expect("valid regex"));

/// Errors that can occur while parsing a dispatch message.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The message is not a dispatch (welcome notices, announcements).
    #[error("Malformed message: expected at least 2 segments, found {segments}")]
    MalformedMessage {
        /// Number of `" / "`-delimited segments found.
        segments: usize,
    },

    /// The address has no map link, so there is nothing to resolve.
    #[error("Unresolvable location: no map link in address '{address}'")]
    UnresolvableLocation {
        /// The address text.
        address: String,
    },
}

impl ParseError {
    /// Returns `true` for outcomes that are routine in the feed rather than
    /// operational failures.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. } | Self::UnresolvableLocation { .. }
        )
    }
}

/// What each positional segment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Datetime,
    Address,
    IncidentType,
    /// Upstream fields the pipeline does not use (tactical channel, grid).
    Reserved,
    Responder,
}

const LAYOUT: [Segment; 6] = [
    Segment::Datetime,
    Segment::Address,
    Segment::IncidentType,
    Segment::Reserved,
    Segment::Reserved,
    Segment::Responder,
];

/// Splits message text into labeled fields.
///
/// Segments missing from the end of the message yield empty fields.
/// Segments past the last defined position are ignored.
///
/// # Errors
///
/// Returns [`ParseError::MalformedMessage`] if there are fewer than two
/// segments.
pub fn tokenize(text: &str) -> Result<IncidentFields, ParseError> {
    let segments: Vec<&str> = text.split(SEPARATOR).collect();

    if segments.len() < 2 {
        return Err(ParseError::MalformedMessage {
            segments: segments.len(),
        });
    }
    if segments.len() > LAYOUT.len() {
        log::debug!(
            "Ignoring {} trailing segment(s) in '{text}'",
            segments.len() - LAYOUT.len()
        );
    }

    let mut fields = IncidentFields::default();
    for (label, value) in LAYOUT.iter().zip(segments) {
        let value = value.trim().to_string();
        match label {
            Segment::Datetime => fields.datetime = value,
            Segment::Address => fields.address = value,
            Segment::IncidentType => fields.type_raw = value,
            Segment::Responder => fields.who = value,
            Segment::Reserved => {}
        }
    }

    Ok(fields)
}

/// Splits `"Cardiac (FHEART)"` into its long description and code.
///
/// Text that does not match the pattern is used for both parts.
#[must_use]
pub fn refine_type(type_raw: &str) -> IncidentType {
    INCIDENT_TYPE_RE.captures(type_raw).map_or_else(
        || IncidentType {
            type_long: type_raw.trim().to_string(),
            code: type_raw.trim().to_string(),
        },
        |caps| IncidentType {
            type_long: caps["long"].trim().to_string(),
            code: caps["code"].trim().to_string(),
        },
    )
}

/// Splits an address into the place text and the map link that follows it.
///
/// The place keeps whatever whitespace preceded the link.
///
/// # Errors
///
/// Returns [`ParseError::UnresolvableLocation`] if the address carries no
/// map link. Addresses are never geocoded from text.
pub fn split_address(address: &str) -> Result<(&str, &str), ParseError> {
    address
        .find(MAP_LINK_MARKER)
        .map(|idx| address.split_at(idx))
        .ok_or_else(|| ParseError::UnresolvableLocation {
            address: address.to_string(),
        })
}

/// Parses a raw dispatch message into a [`CallRecord`] awaiting resolution.
///
/// # Errors
///
/// Returns [`ParseError`] if the message is not a dispatch or has no map
/// link. No partial record is produced.
pub fn parse(raw: &RawMessage) -> Result<CallRecord, ParseError> {
    let fields = tokenize(&raw.text)?;
    let incident_type = refine_type(&fields.type_raw);
    let (place, map_url) = split_address(&fields.address)?;

    let title = format!(
        "{} ({}) - {place}",
        incident_type.type_long, incident_type.code
    );

    Ok(CallRecord {
        id: raw.id.clone(),
        url: raw.permalink(),
        time: raw.timestamp_ms,
        updated: raw.timestamp_ms,
        who: fields.who,
        place: place.to_string(),
        map_url: map_url.to_string(),
        coordinate: None,
        title,
        incident_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "03/26 13:01 / 9600 Falls of Neuse Rd, RA https://t.co/x / Cardiac (FHEART) / T17 / 028V / RFE22";

    fn message(text: &str) -> RawMessage {
        RawMessage::new("845", "WakeDispatch", text, 1_490_547_660_000)
    }

    #[test]
    fn parses_full_dispatch() {
        let record = parse(&message(SAMPLE)).unwrap();
        assert_eq!(record.incident_type.type_long, "Cardiac");
        assert_eq!(record.incident_type.code, "FHEART");
        assert_eq!(record.place, "9600 Falls of Neuse Rd, RA ");
        assert_eq!(record.map_url, "https://t.co/x");
        assert_eq!(record.who, "RFE22");
        assert_eq!(
            record.title,
            "Cardiac (FHEART) - 9600 Falls of Neuse Rd, RA "
        );
        assert_eq!(record.url, "https://twitter.com/WakeDispatch/status/845");
        assert_eq!(record.time, 1_490_547_660_000);
        assert_eq!(record.updated, record.time);
        assert!(record.coordinate.is_none());
    }

    #[test]
    fn rejects_single_segment_messages() {
        for text in [
            "",
            "Welcome to the Wake County dispatch feed!",
            "03/26 13:01/9600 Falls of Neuse Rd",
        ] {
            let err = parse(&message(text)).unwrap_err();
            assert!(
                matches!(err, ParseError::MalformedMessage { segments: 1 }),
                "{text:?} gave {err:?}"
            );
            assert!(err.is_expected());
        }
    }

    #[test]
    fn rejects_address_without_map_link() {
        let err = parse(&message(
            "03/26 13:01 / 9600 Falls of Neuse Rd, RA / Cardiac (FHEART) / T17 / 028V / RFE22",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnresolvableLocation { ref address } if address == "9600 Falls of Neuse Rd, RA"
        ));
        assert!(err.is_expected());
    }

    #[test]
    fn missing_trailing_segments_are_empty() {
        let fields = tokenize("03/26 13:01 / 100 Main St https://t.co/y").unwrap();
        assert_eq!(fields.datetime, "03/26 13:01");
        assert_eq!(fields.address, "100 Main St https://t.co/y");
        assert_eq!(fields.type_raw, "");
        assert_eq!(fields.who, "");
    }

    #[test]
    fn ignores_trailing_segments() {
        let fields = tokenize(&format!("{SAMPLE} / EXTRA")).unwrap();
        assert_eq!(fields.who, "RFE22");

        let record = parse(&message(
            "03/26 13:01 / 1 Elm St https://t.co/x / Fall / Injury (FALL) / T1 / 001 / E5",
        ))
        .unwrap();
        assert_eq!(record.place, "1 Elm St ");
        assert_eq!(record.map_url, "https://t.co/x");
    }

    #[test]
    fn long_message_without_map_link_is_unresolvable() {
        let err = parse(&message(
            "03/26 13:01 / 1 Elm St / Fire (FIRE) / T1 / 001 / E5 / extra",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnresolvableLocation { ref address } if address == "1 Elm St"
        ));
        assert!(err.is_expected());
    }

    #[test]
    fn trims_segments() {
        let fields = tokenize("  03/26 13:01   /   addr https://t.co/z  / Fire ( FALARM ) / a / b /  E1  ")
            .unwrap();
        assert_eq!(fields.datetime, "03/26 13:01");
        assert_eq!(fields.who, "E1");
        let refined = refine_type(&fields.type_raw);
        assert_eq!(refined.type_long, "Fire");
        assert_eq!(refined.code, "FALARM");
    }

    #[test]
    fn unmatched_type_falls_back_to_raw_text() {
        let refined = refine_type("Structure Fire");
        assert_eq!(refined.type_long, "Structure Fire");
        assert_eq!(refined.code, "Structure Fire");

        let record = parse(&message(
            "03/26 13:01 / 1 Elm St https://t.co/q / Structure Fire / T1 / 001 / E5",
        ))
        .unwrap();
        assert_eq!(record.title, "Structure Fire (Structure Fire) - 1 Elm St ");
    }

    #[test]
    fn split_address_keeps_everything_after_marker() {
        let (place, link) = split_address("Capital Blvd https://goo.gl/maps/abc").unwrap();
        assert_eq!(place, "Capital Blvd ");
        assert_eq!(link, "https://goo.gl/maps/abc");
    }
}
