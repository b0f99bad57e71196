//! Dispatch message feeds.
//!
//! A feed yields newline-delimited status JSON as [`RawMessage`]s. Two
//! transports are supported: any async reader (stdin, a capture file) and a
//! long-lived HTTP stream. Blank keep-alive lines and payloads that are not
//! statuses (delete notices, limit notices) are skipped. A transport error
//! ends the feed; reconnecting is left to whoever owns the feed.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt as _};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, Lines};
use wake_dispatch_models::RawMessage;

/// Errors that can occur while reading a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error (stdin or file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream endpoint refused the connection.
    #[error("Feed returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A line could not be decoded as a status.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what went wrong.
        message: String,
    },
}

/// A source of raw dispatch messages.
#[async_trait]
pub trait Feed: Send {
    /// Waits for the next message. Returns `None` once the feed has ended.
    async fn next_event(&mut self) -> Option<Result<RawMessage, FeedError>>;
}

#[async_trait]
impl<F: Feed + ?Sized> Feed for Box<F> {
    async fn next_event(&mut self) -> Option<Result<RawMessage, FeedError>> {
        (**self).next_event().await
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Text(String),
    Millis(i64),
}

#[derive(Debug, Deserialize)]
struct User {
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id_str: String,
    text: String,
    timestamp_ms: Timestamp,
    user: User,
}

/// Decodes one feed line.
///
/// Returns `Ok(None)` for blank lines and for payloads without a `text`
/// field.
///
/// # Errors
///
/// Returns [`FeedError::Decode`] if the line is not JSON or a status is
/// missing required fields.
pub fn decode_status(line: &str) -> Result<Option<RawMessage>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| FeedError::Decode {
            message: format!("invalid JSON: {e}"),
        })?;
    if value.get("text").is_none() {
        log::debug!("Skipping non-status feed payload");
        return Ok(None);
    }

    let status: Status = serde_json::from_value(value).map_err(|e| FeedError::Decode {
        message: format!("invalid status: {e}"),
    })?;

    let timestamp_ms = match status.timestamp_ms {
        Timestamp::Millis(ms) => ms,
        Timestamp::Text(text) => text.trim().parse().map_err(|e| FeedError::Decode {
            message: format!("invalid timestamp_ms '{text}': {e}"),
        })?,
    };

    Ok(Some(RawMessage {
        id: status.id_str,
        handle: status.user.screen_name,
        text: status.text,
        timestamp_ms,
    }))
}

/// Turns a decode result into a feed event, skipping what should be skipped.
fn line_event(line: &str) -> Option<Result<RawMessage, FeedError>> {
    match decode_status(line) {
        Ok(Some(message)) => Some(Ok(message)),
        Ok(None) => None,
        Err(e) => {
            log::warn!("Skipping undecodable feed line: {e}");
            None
        }
    }
}

/// Feed reading newline-delimited statuses from an async reader.
pub struct JsonLinesFeed<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesFeed<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }
}

impl JsonLinesFeed<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Reads statuses from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Feed for JsonLinesFeed<R> {
    async fn next_event(&mut self) -> Option<Result<RawMessage, FeedError>> {
        while !self.finished {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = line_event(&line) {
                        return Some(event);
                    }
                }
                Ok(None) => self.finished = true,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Connection settings for [`HttpStreamFeed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Streaming endpoint URL.
    pub url: String,
    /// Bearer token sent with the request, if any.
    pub bearer_token: Option<String>,
    /// Account id to follow, sent as the `follow` query parameter.
    pub follow: Option<String>,
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

/// Feed reading newline-delimited statuses from a long-lived HTTP response.
pub struct HttpStreamFeed {
    chunks: ChunkStream,
    buffer: Vec<u8>,
    finished: bool,
}

impl HttpStreamFeed {
    /// Opens the stream.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the connection fails or the endpoint
    /// answers with a non-success status.
    pub async fn connect(client: &reqwest::Client, config: &StreamConfig) -> Result<Self, FeedError> {
        let mut request = client.get(&config.url);
        if let Some(follow) = &config.follow {
            request = request.query(&[("follow", follow)]);
        }
        if let Some(token) = &config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                message,
            });
        }

        log::info!("Connected to feed at {}", config.url);
        Ok(Self::from_chunks(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec())),
        )))
    }

    fn from_chunks(chunks: ChunkStream) -> Self {
        Self {
            chunks,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Removes and returns the next complete line from the buffer.
    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl Feed for HttpStreamFeed {
    async fn next_event(&mut self) -> Option<Result<RawMessage, FeedError>> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(event) = line_event(&line) {
                    return Some(event);
                }
            }
            if self.finished {
                return None;
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }
}
