#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion of the Wake County dispatch feed.
//!
//! Raw messages arrive from a [`feed::Feed`], are parsed, have their map
//! links resolved to coordinates, are converted to point features and are
//! written to a [`wake_dispatch_store::Store`]. Each message is handled on
//! its own task; see [`pipeline::IngestionPipeline`].

pub mod convert;
pub mod feed;
pub mod pipeline;

pub use convert::to_feature;
pub use feed::{Feed, FeedError, HttpStreamFeed, JsonLinesFeed, StreamConfig};
pub use pipeline::{IngestError, IngestionPipeline, Stage};
