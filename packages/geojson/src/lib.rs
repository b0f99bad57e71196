#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `GeoJSON` feature collections built from stored dispatches.
//!
//! [`aggregate`] turns time-ordered store rows into a [`FeatureCollection`]
//! with response metadata and a bounding box over every feature. [`query`]
//! wraps a store read plus aggregation and always yields a well-formed
//! collection paired with the HTTP status to send.

pub mod window;

use chrono::{DateTime, Utc};
use wake_dispatch_models::{
    BoundingBox, CollectionMetadata, FeatureCollection, FeatureCollectionType, PointFeature,
    StoredRow,
};
use wake_dispatch_store::Store;

pub use window::{IntervalUnit, TimeWindow, WindowError};

/// Version reported in every collection's metadata.
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default collection title prefix.
pub const DEFAULT_TITLE: &str = "All Wake County dispatches";

/// Request details echoed into collection metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Full URL of the request.
    pub url: String,
    /// Collection title.
    pub title: String,
    /// HTTP status the collection will be returned with.
    pub status: u16,
}

/// Folds feature positions into a bounding box.
///
/// The first position seeds all six bounds. Features without a usable
/// position are skipped. Returns `None` when no feature has one.
#[must_use]
pub fn fold_bbox<'a>(features: impl IntoIterator<Item = &'a PointFeature>) -> Option<BoundingBox> {
    features
        .into_iter()
        .filter_map(|feature| feature.geometry.position())
        .fold(None, |bbox, position| match bbox {
            None => Some(BoundingBox::from_position(position)),
            Some(mut bbox) => {
                bbox.extend(position);
                Some(bbox)
            }
        })
}

/// Builds a collection from store rows in the order given.
#[must_use]
pub fn aggregate(rows: Vec<StoredRow>, context: RequestContext) -> FeatureCollection {
    let features: Vec<PointFeature> = rows.into_iter().map(|row| row.value).collect();
    let bbox = fold_bbox(&features);

    FeatureCollection {
        kind: FeatureCollectionType::FeatureCollection,
        metadata: CollectionMetadata {
            url: context.url,
            title: context.title,
            api_version: API_VERSION.to_string(),
            count: features.len(),
            status: context.status,
            message: None,
        },
        features,
        bbox,
    }
}

/// An empty collection describing a failed request.
#[must_use]
pub fn error_collection(context: RequestContext, message: impl Into<String>) -> FeatureCollection {
    let mut collection = aggregate(Vec::new(), context);
    collection.metadata.message = Some(message.into());
    collection
}

/// Reads `window` from `store` and aggregates the result.
///
/// Returns the HTTP status alongside the body: 200 on success, 400 if the
/// window cannot be applied, 500 if the store read fails. Never fails.
pub async fn query(
    store: &dyn Store,
    window: &TimeWindow,
    now: DateTime<Utc>,
    url: String,
    title_prefix: &str,
) -> (u16, FeatureCollection) {
    let title = window.title(title_prefix);

    let options = match window.view_options(now) {
        Ok(options) => options,
        Err(e) => return invalid_request(url, title, &e),
    };

    match store.query_by_time_window(&options).await {
        Ok(rows) => {
            log::debug!("{title}: {} row(s) from {}", rows.len(), store.name());
            let context = RequestContext {
                url,
                title,
                status: 200,
            };
            (200, aggregate(rows, context))
        }
        Err(e) => {
            log::error!("Failed to read dispatches from {}: {e}", store.name());
            let context = RequestContext {
                url,
                title,
                status: 500,
            };
            (500, error_collection(context, "Failed to read dispatches"))
        }
    }
}

/// A 400 collection for a window that could not be interpreted.
#[must_use]
pub fn invalid_request(url: String, title: String, error: &WindowError) -> (u16, FeatureCollection) {
    log::debug!("Rejecting window request {url}: {error}");
    let context = RequestContext {
        url,
        title,
        status: 400,
    };
    (400, error_collection(context, error.to_string()))
}
