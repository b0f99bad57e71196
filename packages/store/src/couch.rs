//! `CouchDB` store over the HTTP API.
//!
//! Features are stored as documents keyed by feature id. Time-window reads
//! go through the `_design/geojson` `timestamp` view, which emits each
//! document under its `properties.time`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use wake_dispatch_models::{PointFeature, StoredRow, ViewOptions};

use crate::{Store, StoreError};

/// Design document holding the time index.
pub const DESIGN_NAME: &str = "geojson";

/// View inside [`DESIGN_NAME`] keyed by `properties.time`.
pub const VIEW_NAME: &str = "timestamp";

const VIEW_MAP_FUNCTION: &str = "function(doc) { emit(doc.properties.time, doc); }";

/// The design document the store expects to find in its database.
#[must_use]
pub fn design_document() -> serde_json::Value {
    serde_json::json!({
        "_id": format!("_design/{DESIGN_NAME}"),
        "views": {
            VIEW_NAME: { "map": VIEW_MAP_FUNCTION }
        }
    })
}

/// Returns `true` if `existing` has the same views as [`design_document`],
/// ignoring `_rev` and any other bookkeeping fields.
#[must_use]
pub fn design_matches(existing: &serde_json::Value) -> bool {
    existing.get("views") == design_document().get("views")
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    rows: Vec<serde_json::Value>,
}

/// Decodes a view response body, skipping rows that are not features.
fn decode_rows(body: &str) -> Result<Vec<StoredRow>, serde_json::Error> {
    let view: ViewResponse = serde_json::from_str(body)?;

    Ok(view
        .rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned();
            serde_json::from_value::<StoredRow>(row)
                .inspect_err(|e| log::warn!("Skipping undecodable row {id:?}: {e}"))
                .ok()
        })
        .collect())
}

/// A `CouchDB` database reached over HTTP.
#[derive(Debug, Clone)]
pub struct CouchStore {
    client: reqwest::Client,
    base_url: Url,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl CouchStore {
    /// Creates a store for `database` on the server at `url`.
    ///
    /// Credentials embedded in `url` are removed from it and sent as HTTP
    /// basic auth instead.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if `url` cannot be parsed or
    /// `database` is empty, or [`StoreError::Http`] if the HTTP client
    /// cannot be built.
    pub fn new(url: &str, database: &str) -> Result<Self, StoreError> {
        if database.trim().is_empty() {
            return Err(StoreError::InvalidConfig {
                message: "database name is empty (set COUCHDB_DATABASE)".to_string(),
            });
        }

        let mut base_url = Url::parse(url).map_err(|e| StoreError::InvalidConfig {
            message: format!("invalid CouchDB URL: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidConfig {
                message: format!("CouchDB URL '{url}' cannot be a base URL"),
            });
        }

        let username = Some(base_url.username().to_string()).filter(|u| !u.is_empty());
        let password = base_url.password().map(String::from);
        let invalid = |()| StoreError::InvalidConfig {
            message: "cannot strip credentials from CouchDB URL".to_string(),
        };
        base_url.set_username("").map_err(invalid)?;
        base_url.set_password(None).map_err(invalid)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            database: database.to_string(),
            username,
            password,
        })
    }

    /// Server URL with credentials removed.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of `segments` inside this store's database.
    fn database_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    /// Creates the database. Returns `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the request fails or the server refuses.
    pub async fn create_database(&self) -> Result<bool, StoreError> {
        let response = self
            .request(Method::PUT, self.database_url(&[]))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(true),
            StatusCode::PRECONDITION_FAILED => Ok(false),
            status => Err(status_error(status, response).await),
        }
    }

    /// Installs or updates the `timestamp` view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the design document cannot be read or
    /// written.
    pub async fn ensure_views(&self) -> Result<(), StoreError> {
        let url = self.database_url(&["_design", DESIGN_NAME]);
        let response = self.request(Method::GET, url.clone()).send().await?;

        let mut document = design_document();
        match response.status() {
            StatusCode::NOT_FOUND => {
                log::info!("Creating view _design/{DESIGN_NAME}/{VIEW_NAME}");
            }
            status if status.is_success() => {
                let existing: serde_json::Value = response.json().await?;
                if design_matches(&existing) {
                    log::debug!("View _design/{DESIGN_NAME}/{VIEW_NAME} is up to date");
                    return Ok(());
                }
                log::info!("Updating view _design/{DESIGN_NAME}/{VIEW_NAME}");
                document["_rev"] = existing["_rev"].clone();
            }
            status => return Err(status_error(status, response).await),
        }

        let response = self
            .request(Method::PUT, url)
            .json(&document)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status(), response).await)
        }
    }

    /// The view URL with `options` encoded as `CouchDB` query parameters.
    fn view_url(&self, options: &ViewOptions) -> Url {
        let mut url = self.database_url(&["_design", DESIGN_NAME, "_view", VIEW_NAME]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("descending", if options.descending { "true" } else { "false" });
            if let Some(limit) = options.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(endkey) = options.endkey {
                query.append_pair("endkey", &endkey.to_string());
            }
        }
        url
    }
}

/// Builds a [`StoreError::Status`] from an unexpected response.
async fn status_error(status: StatusCode, response: reqwest::Response) -> StoreError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    StoreError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Store for CouchStore {
    fn name(&self) -> &str {
        "couchdb"
    }

    async fn setup(&self) -> Result<(), StoreError> {
        if self.create_database().await? {
            log::info!("Created database '{}'", self.database);
        }
        self.ensure_views().await
    }

    async fn insert(&self, feature: &PointFeature) -> Result<(), StoreError> {
        let response = self
            .request(Method::PUT, self.database_url(&[feature.id.as_str()]))
            .json(feature)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::Conflict {
                id: feature.id.clone(),
            }),
            status => Err(status_error(status, response).await),
        }
    }

    async fn query_by_time_window(
        &self,
        options: &ViewOptions,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let response = self
            .request(Method::GET, self.view_url(options))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), response).await);
        }

        let body = response.text().await?;
        Ok(decode_rows(&body)?)
    }
}
