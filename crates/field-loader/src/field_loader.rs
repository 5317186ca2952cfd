// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::{BatchLoader, BatchingCache, FetchError, FieldValue, LoadError, LoaderConfig};

/// Fetches a subset of an entity's fields from the backing store.
#[async_trait]
pub trait EntityFetcher<K>: Send + Sync + 'static {
    /// Fetch `fields` of the entity identified by `key`.
    ///
    /// Returns `Ok(None)` (or `Ok(Some(Value::Null))`) if there is no such entity. Fields may be
    /// dotted paths into the returned record; a field missing from the record reads as `null`.
    async fn fetch(&self, key: &K, fields: &[String]) -> Result<Option<Value>, FetchError>;
}

/// The [`BatchLoader`] behind one entity's field cache: each batch of field names turns into one
/// [`EntityFetcher::fetch`] call.
pub struct EntityFields<K, F> {
    key: K,
    fetcher: Arc<F>,
}

#[async_trait]
impl<K, F> BatchLoader<String> for EntityFields<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: EntityFetcher<K>,
{
    type Value = FieldValue;

    async fn load(&self, fields: &[String]) -> Result<Vec<FieldValue>, LoadError> {
        let record = self.fetcher.fetch(&self.key, fields).await?;

        Ok(match record {
            None | Some(Value::Null) => {
                trace!(fields = fields.len(), "Entity not found");
                vec![FieldValue::Missing; fields.len()]
            }
            Some(record) => fields
                .iter()
                .map(|field| FieldValue::from_record(&record, field))
                .collect(),
        })
    }
}

type EntityCache<K, F> = BatchingCache<String, EntityFields<K, F>>;

/// Loads entity fields, batching and caching per entity.
///
/// Fields requested for the same entity within one batch window are fetched together, in the
/// order they were first asked for. Fields already fetched (or in flight) are never fetched
/// again until cleared. Different entities are fetched independently.
pub struct FieldLoader<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: EntityFetcher<K>,
{
    fetcher: Arc<F>,
    entities: Mutex<HashMap<K, Arc<EntityCache<K, F>>>>,
    config: LoaderConfig,
}

impl<K, F> FieldLoader<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: EntityFetcher<K>,
{
    pub fn new(fetcher: F) -> Self {
        Self::with_config(fetcher, LoaderConfig::default())
    }

    pub fn with_config(fetcher: F, config: LoaderConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            entities: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Load `fields` of the entity identified by `key`.
    ///
    /// Returns `None` if the entity doesn't exist, otherwise a map from each requested field to its
    /// value (`null` for fields the entity lacks). An empty `fields` has nothing present, so it
    /// yields `None` without fetching anything.
    pub async fn load<S: AsRef<str>>(
        &self,
        key: K,
        fields: &[S],
    ) -> Result<Option<IndexMap<String, Value>>, LoadError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        let entity = self.entity(key);

        let values = entity.load_many(&fields).await?;

        if values.iter().all(FieldValue::is_missing) {
            return Ok(None);
        }

        Ok(Some(
            fields
                .into_iter()
                .zip(values.into_iter().map(FieldValue::into_value))
                .collect(),
        ))
    }

    /// Cache `value` for `field` of `key`, unless that field is already loaded or in flight.
    pub fn prime(&self, key: K, field: &str, value: Value) -> &Self {
        self.entity(key)
            .prime(field.to_string(), FieldValue::Present(value));
        self
    }

    /// Forget everything cached for `key`.
    pub fn clear(&self, key: &K) -> &Self {
        self.entities().remove(key);
        self
    }

    pub fn clear_all(&self) -> &Self {
        self.entities().clear();
        self
    }

    fn entity(&self, key: K) -> Arc<EntityCache<K, F>> {
        self.entities()
            .entry(key)
            .or_insert_with_key(|key| {
                Arc::new(BatchingCache::with_config(
                    EntityFields {
                        key: key.clone(),
                        fetcher: self.fetcher.clone(),
                    },
                    self.config,
                ))
            })
            .clone()
    }

    fn entities(&self) -> MutexGuard<'_, HashMap<K, Arc<EntityCache<K, F>>>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
