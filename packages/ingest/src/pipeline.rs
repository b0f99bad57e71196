//! Per-message ingestion: parse, resolve, convert, store.
//!
//! Each message moves through [`Stage`]s and stops at the first failure.
//! Messages are handled as independent tasks, so a slow redirect chain
//! never holds up the next message. Store writes are best-effort: the
//! pipeline hands the feature off and does not wait for acknowledgement
//! before accepting more input. A failed write is logged and the record is
//! dropped; there is no retry queue.

use std::sync::Arc;

use strum_macros::{AsRefStr, Display};
use tokio::task::{JoinHandle, JoinSet};
use wake_dispatch_models::{PointFeature, RawMessage};
use wake_dispatch_parser::ParseError;
use wake_dispatch_resolver::{CoordinateResolver, HttpProbe, RedirectProbe, ResolveError};
use wake_dispatch_store::{Store, StoreError};

use crate::convert::to_feature;
use crate::feed::Feed;

/// Where a message is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Received,
    Parsed,
    Resolving,
    Converted,
    Stored,
}

/// Errors that end processing of a message.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The message could not be parsed into a call record.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The map link could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The feature could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Returns `true` for routine outcomes (non-dispatch messages, messages
    /// without a map link) that are logged quietly.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        match self {
            Self::Parse(e) => e.is_expected(),
            Self::Resolve(_) | Self::Store(_) => false,
        }
    }
}

/// Logs `error` for message `id` at the severity its kind calls for.
fn report(id: &str, error: &IngestError) {
    if error.is_expected() {
        log::debug!("Skipping message {id}: {error}");
    } else {
        log::error!("Failed to ingest message {id}: {error}");
    }
}

/// Orchestrates parser, resolver, converter and store for each message.
pub struct IngestionPipeline<P = HttpProbe> {
    resolver: Arc<CoordinateResolver<P>>,
    store: Arc<dyn Store>,
}

impl<P> Clone for IngestionPipeline<P> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            store: Arc::clone(&self.store),
        }
    }
}

impl<P: RedirectProbe + 'static> IngestionPipeline<P> {
    #[must_use]
    pub fn new(resolver: CoordinateResolver<P>, store: Arc<dyn Store>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            store,
        }
    }

    /// Runs a message through parsing, resolution and conversion.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] from the first stage that fails.
    pub async fn process(&self, raw: &RawMessage) -> Result<PointFeature, IngestError> {
        log::trace!("Message {}: {}", raw.id, Stage::Received);

        let mut record = wake_dispatch_parser::parse(raw)?;
        log::trace!("Message {}: {}", raw.id, Stage::Parsed);

        log::trace!("Message {}: {} {}", raw.id, Stage::Resolving, record.map_url);
        let coordinate = self.resolver.resolve(&record.map_url).await?;
        record.coordinate = Some(coordinate);

        let feature = to_feature(&record, coordinate);
        log::trace!("Message {}: {}", raw.id, Stage::Converted);
        Ok(feature)
    }

    /// Hands `feature` to the store without waiting for the write.
    ///
    /// The returned handle completes once the write has been attempted;
    /// failures are logged, never returned.
    pub fn submit(&self, feature: PointFeature) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.insert(&feature).await {
                Ok(()) => log::trace!("Message {}: {}", feature.id, Stage::Stored),
                Err(e) => report(&feature.id, &IngestError::from(e)),
            }
        })
    }

    /// Processes one message and submits the result.
    ///
    /// Returns the write handle on success, `None` if the message was
    /// dropped (the reason has already been logged).
    pub async fn handle(&self, raw: RawMessage) -> Option<JoinHandle<()>> {
        match self.process(&raw).await {
            Ok(feature) => Some(self.submit(feature)),
            Err(e) => {
                report(&raw.id, &e);
                None
            }
        }
    }

    /// Consumes `feed` until it ends, handling every message as its own
    /// task. Returns the number of messages received.
    ///
    /// In-flight messages are drained before returning. Feed errors are
    /// logged; the feed decides whether it continues after one.
    pub async fn run<F: Feed>(&self, mut feed: F) -> usize {
        let mut tasks = JoinSet::new();
        let mut received = 0;

        while let Some(event) = feed.next_event().await {
            match event {
                Ok(raw) => {
                    received += 1;
                    let pipeline = self.clone();
                    tasks.spawn(async move {
                        let Some(write) = pipeline.handle(raw).await else {
                            return;
                        };
                        if let Err(e) = write.await {
                            log::error!("Store write task failed: {e}");
                        }
                    });
                }
                Err(e) => log::error!("Feed error: {e}"),
            }
            while tasks.try_join_next().is_some() {}
        }

        log::info!(
            "Feed ended after {received} message(s); waiting for {} in flight",
            tasks.len()
        );
        while tasks.join_next().await.is_some() {}
        received
    }
}
