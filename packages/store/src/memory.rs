//! In-process store with `CouchDB` view semantics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use wake_dispatch_models::{PointFeature, StoredRow, ViewOptions};

use crate::{Store, StoreError};

/// Keeps features in memory, keyed by id.
///
/// Queries order by `properties.time` (ties broken by id) and apply
/// `descending`, `endkey` and `limit` the way a `CouchDB` view does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    features: RwLock<BTreeMap<String, PointFeature>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored features.
    pub async fn len(&self) -> usize {
        self.features.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.features.read().await.is_empty()
    }

    /// Looks up a stored feature by id.
    pub async fn get(&self, id: &str) -> Option<PointFeature> {
        self.features.read().await.get(id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, feature: &PointFeature) -> Result<(), StoreError> {
        let mut features = self.features.write().await;
        if features.contains_key(&feature.id) {
            return Err(StoreError::Conflict {
                id: feature.id.clone(),
            });
        }
        features.insert(feature.id.clone(), feature.clone());
        drop(features);
        Ok(())
    }

    async fn query_by_time_window(
        &self,
        options: &ViewOptions,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let mut selected: Vec<PointFeature> = self
            .features
            .read()
            .await
            .values()
            .filter(|feature| {
                options.endkey.is_none_or(|endkey| {
                    if options.descending {
                        feature.properties.time >= endkey
                    } else {
                        feature.properties.time <= endkey
                    }
                })
            })
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            (a.properties.time, &a.id).cmp(&(b.properties.time, &b.id))
        });
        if options.descending {
            selected.reverse();
        }
        if let Some(limit) = options.limit {
            selected.truncate(limit as usize);
        }

        Ok(selected
            .into_iter()
            .map(|feature| StoredRow {
                id: Some(feature.id.clone()),
                key: serde_json::json!(feature.properties.time),
                value: feature,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use wake_dispatch_models::{Coordinate, FeatureProperties, FeatureType, Geometry};

    use super::*;

    fn feature(id: &str, time: i64) -> PointFeature {
        PointFeature {
            kind: FeatureType::Feature,
            id: id.to_string(),
            geometry: Geometry::point(Coordinate {
                lat: 35.7,
                lon: -78.6,
            }),
            properties: FeatureProperties {
                place: "1 Elm St ".to_string(),
                time,
                title: "Fire (FIRE) - 1 Elm St ".to_string(),
                type_long: "Fire".to_string(),
                type_code: "FIRE".to_string(),
                updated: time,
                url: format!("https://twitter.com/WakeDispatch/status/{id}"),
                who: "E1".to_string(),
            },
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, time) in [("b", 200), ("a", 100), ("c", 300), ("d", 300)] {
            store.insert(&feature(id, time)).await.unwrap();
        }
        store
    }

    fn ids(rows: &[StoredRow]) -> Vec<&str> {
        rows.iter().map(|row| row.value.id.as_str()).collect()
    }

    #[tokio::test]
    async fn orders_descending_newest_first() {
        let store = seeded().await;
        let rows = store
            .query_by_time_window(&ViewOptions {
                descending: true,
                ..ViewOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["d", "c", "b", "a"]);
        assert_eq!(rows[0].key, serde_json::json!(300));
    }

    #[tokio::test]
    async fn orders_ascending_by_default() {
        let store = seeded().await;
        let rows = store
            .query_by_time_window(&ViewOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn descending_endkey_is_oldest_included() {
        let store = seeded().await;
        let rows = store
            .query_by_time_window(&ViewOptions {
                descending: true,
                endkey: Some(200),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn ascending_endkey_is_newest_included() {
        let store = seeded().await;
        let rows = store
            .query_by_time_window(&ViewOptions {
                descending: false,
                endkey: Some(200),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn limit_keeps_latest() {
        let store = seeded().await;
        let rows = store
            .query_by_time_window(&ViewOptions {
                descending: true,
                limit: Some(1),
                endkey: None,
            })
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["d"]);
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let store = seeded().await;
        let err = store.insert(&feature("a", 999)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref id } if id == "a"));
        assert_eq!(store.len().await, 4);
        assert_eq!(store.get("a").await.unwrap().properties.time, 100);
    }

    #[tokio::test]
    async fn empty_store_returns_no_rows() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        let rows = store
            .query_by_time_window(&ViewOptions::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
