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
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{self, BoxFuture, Shared},
};
use tracing::{debug, trace, warn};

use crate::{LoadError, LoaderConfig};

/// Loads values for a batch of keys in one go.
#[async_trait]
pub trait BatchLoader<K>: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Must return exactly one value per key, in the order of `keys`.
    async fn load(&self, keys: &[K]) -> Result<Vec<Self::Value>, LoadError>;
}

type BatchFuture<V> = Shared<BoxFuture<'static, Result<Arc<Vec<V>>, LoadError>>>;
type ValueFuture<V> = Shared<BoxFuture<'static, Result<V, LoadError>>>;

struct CacheEntry<V> {
    // `None` for primed entries
    batch_id: Option<u64>,
    value: ValueFuture<V>,
}

struct PendingBatch<K, V> {
    id: u64,
    keys: Vec<K>,
    future: BatchFuture<V>,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    // Keys waiting for the batch window to close. Once dispatched, a batch is no longer pending
    // and new keys start the next one.
    pending: Option<PendingBatch<K, V>>,
    next_batch_id: u64,
}

/// A cache in front of a [`BatchLoader`].
///
/// Keys requested during one batch window are collected and handed to the loader together. Every
/// caller awaits the same in-flight future for a key, so the loader sees each key at most once.
/// Successful values are kept (unless caching is turned off in [`LoaderConfig`]); failures are
/// delivered to every waiting caller and then forgotten so a later load retries.
pub struct BatchingCache<K, L: BatchLoader<K>> {
    loader: Arc<L>,
    state: Arc<Mutex<CacheState<K, L::Value>>>,
    config: LoaderConfig,
}

impl<K, L> BatchingCache<K, L>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    L: BatchLoader<K>,
{
    pub fn new(loader: L) -> Self {
        Self::with_config(loader, LoaderConfig::default())
    }

    pub fn with_config(loader: L, config: LoaderConfig) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                pending: None,
                next_batch_id: 0,
            })),
            config,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub async fn load(&self, key: K) -> Result<L::Value, LoadError> {
        let value = {
            let mut state = lock(&self.state);
            self.value_future(&mut state, key)
        };
        value.await
    }

    /// Load several keys, returning values in the order of `keys`. Fails if any key fails.
    pub async fn load_many(&self, keys: &[K]) -> Result<Vec<L::Value>, LoadError> {
        let values: Vec<_> = {
            let mut state = lock(&self.state);
            keys.iter()
                .map(|key| self.value_future(&mut state, key.clone()))
                .collect()
        };
        future::try_join_all(values).await
    }

    /// Cache `value` for `key` unless the key already has an entry (loaded or in flight).
    pub fn prime(&self, key: K, value: L::Value) -> &Self {
        lock(&self.state)
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry {
                batch_id: None,
                value: future::ready(Ok(value)).boxed().shared(),
            });
        self
    }

    /// Forget `key`. A load already waiting on it still completes.
    pub fn clear(&self, key: &K) -> &Self {
        lock(&self.state).entries.remove(key);
        self
    }

    pub fn clear_all(&self) -> &Self {
        lock(&self.state).entries.clear();
        self
    }

    fn value_future(
        &self,
        state: &mut CacheState<K, L::Value>,
        key: K,
    ) -> ValueFuture<L::Value> {
        if let Some(entry) = state.entries.get(&key) {
            trace!(batch_id = entry.batch_id, "Reusing cache entry");
            return entry.value.clone();
        }

        let (batch_id, index, batch) = self.enqueue(state, key.clone());

        let value = batch
            .map(move |values| {
                values.and_then(|values| {
                    values
                        .get(index)
                        .cloned()
                        .ok_or(LoadError::BatchSizeMismatch {
                            expected: index + 1,
                            actual: values.len(),
                        })
                })
            })
            .boxed()
            .shared();

        state.entries.insert(
            key,
            CacheEntry {
                batch_id: Some(batch_id),
                value: value.clone(),
            },
        );

        value
    }

    /// Add `key` to the pending batch (opening one if needed) unless it is already queued there.
    /// Returns the batch id, the key's position in it, and the batch's future.
    fn enqueue(
        &self,
        state: &mut CacheState<K, L::Value>,
        key: K,
    ) -> (u64, usize, BatchFuture<L::Value>) {
        let CacheState {
            pending,
            next_batch_id,
            ..
        } = state;

        let batch = pending.get_or_insert_with(|| {
            let id = *next_batch_id;
            *next_batch_id += 1;
            PendingBatch {
                id,
                keys: vec![],
                future: self.dispatch(id),
            }
        });

        // A key cleared while its batch is still pending is already queued
        let index = match batch.keys.iter().position(|queued| queued == &key) {
            Some(index) => index,
            None => {
                batch.keys.push(key);
                batch.keys.len() - 1
            }
        };

        (batch.id, index, batch.future.clone())
    }

    fn dispatch(&self, batch_id: u64) -> BatchFuture<L::Value> {
        let loader = self.loader.clone();
        let state = Arc::downgrade(&self.state);
        let LoaderConfig { batch_delay, cache } = self.config;

        async move {
            wait_for_batch_window(batch_delay).await;

            let keys = take_pending_keys(&state, batch_id);
            debug!(batch_id, keys = keys.len(), "Dispatching batch");

            let result = match loader.load(&keys).await {
                Ok(values) if values.len() == keys.len() => Ok(Arc::new(values)),
                Ok(values) => Err(LoadError::BatchSizeMismatch {
                    expected: keys.len(),
                    actual: values.len(),
                }),
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                warn!(batch_id, error = %e, "Batch load failed");
            }

            if result.is_err() || !cache {
                if let Some(state) = state.upgrade() {
                    lock(&state)
                        .entries
                        .retain(|_, entry| entry.batch_id != Some(batch_id));
                }
            }

            result
        }
        .boxed()
        .shared()
    }
}

async fn wait_for_batch_window(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await
    } else {
        tokio::time::sleep(delay).await
    }
}

fn take_pending_keys<K, V>(state: &Weak<Mutex<CacheState<K, V>>>, batch_id: u64) -> Vec<K> {
    let Some(state) = state.upgrade() else {
        return vec![];
    };
    let mut state = lock(&state);

    state
        .pending
        .take_if(|batch| batch.id == batch_id)
        .map(|batch| batch.keys)
        .unwrap_or_default()
}

fn lock<K, V>(state: &Mutex<CacheState<K, V>>) -> MutexGuard<'_, CacheState<K, V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use test_log::test;

    /// Returns ten times each key, recording every batch it is asked for.
    #[derive(Default)]
    struct TimesTen {
        batches: Mutex<Vec<Vec<u64>>>,
        fail_next: AtomicBool,
        latency: Duration,
        drop_last: bool,
    }

    impl TimesTen {
        fn batches(&self) -> Vec<Vec<u64>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchLoader<u64> for TimesTen {
        type Value = u64;

        async fn load(&self, keys: &[u64]) -> Result<Vec<u64>, LoadError> {
            self.batches.lock().unwrap().push(keys.to_vec());

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if self.fail_next.swap(false, Ordering::SeqCst) {
                let error: crate::FetchError = "backend unavailable".into();
                return Err(error.into());
            }

            let mut values: Vec<_> = keys.iter().map(|key| key * 10).collect();
            if self.drop_last {
                values.pop();
            }
            Ok(values)
        }
    }

    #[test(tokio::test(start_paused = true))]
    async fn coalesces_keys_within_window() {
        let cache = BatchingCache::new(TimesTen::default());

        let (one, two, many) = futures::join!(
            cache.load(1),
            cache.load(2),
            cache.load_many(&[2, 3, 3])
        );

        assert_eq!(one.unwrap(), 10);
        assert_eq!(two.unwrap(), 20);
        assert_eq!(many.unwrap(), vec![20, 30, 30]);
        assert_eq!(cache.loader().batches(), vec![vec![1, 2, 3]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn serves_loaded_keys_from_cache() {
        let cache = BatchingCache::new(TimesTen::default());

        assert_eq!(cache.load(1).await.unwrap(), 10);
        assert_eq!(cache.load_many(&[1, 4]).await.unwrap(), vec![10, 40]);
        assert_eq!(cache.load(4).await.unwrap(), 40);

        assert_eq!(cache.loader().batches(), vec![vec![1], vec![4]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn keys_arriving_after_dispatch_start_a_new_batch() {
        let cache = BatchingCache::new(TimesTen {
            latency: Duration::from_millis(10),
            ..Default::default()
        });

        let late = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.load_many(&[1, 2]).await
        };

        let (first, late) = futures::join!(cache.load(1), late);

        assert_eq!(first.unwrap(), 10);
        // Key 1 was still in flight and is shared, key 2 went into the next batch
        assert_eq!(late.unwrap(), vec![10, 20]);
        assert_eq!(cache.loader().batches(), vec![vec![1], vec![2]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn failures_reach_every_waiter_and_are_not_cached() {
        let cache = BatchingCache::new(TimesTen {
            fail_next: AtomicBool::new(true),
            ..Default::default()
        });

        let (one, two) = futures::join!(cache.load(1), cache.load(2));

        for result in [one, two] {
            match result {
                Err(LoadError::BatchFailed(e)) => assert_eq!(e.to_string(), "backend unavailable"),
                other => panic!("Expected a batch failure, got {other:?}"),
            }
        }

        assert_eq!(cache.load(1).await.unwrap(), 10);
        assert_eq!(cache.loader().batches(), vec![vec![1, 2], vec![1]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn short_batch_is_an_error() {
        let cache = BatchingCache::new(TimesTen {
            drop_last: true,
            ..Default::default()
        });

        let (one, two) = futures::join!(cache.load(1), cache.load(2));

        assert!(matches!(
            one,
            Err(LoadError::BatchSizeMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(two.is_err());
    }

    #[test(tokio::test(start_paused = true))]
    async fn prime_and_clear() {
        let cache = BatchingCache::new(TimesTen::default());

        cache.prime(1, 100);
        assert_eq!(cache.load(1).await.unwrap(), 100);
        assert!(cache.loader().batches().is_empty());

        // Priming doesn't replace an existing entry
        cache.prime(1, 200);
        assert_eq!(cache.load(1).await.unwrap(), 100);

        cache.clear(&1);
        assert_eq!(cache.load(1).await.unwrap(), 10);
        assert_eq!(cache.load(2).await.unwrap(), 20);

        cache.clear_all();
        assert_eq!(cache.load_many(&[1, 2]).await.unwrap(), vec![10, 20]);

        assert_eq!(
            cache.loader().batches(),
            vec![vec![1], vec![2], vec![1, 2]]
        );
    }

    #[test(tokio::test(start_paused = true))]
    async fn reloading_a_cleared_pending_key_queues_it_once() {
        let cache = BatchingCache::new(TimesTen::default());

        let reload = async {
            cache.clear(&1);
            cache.load(1).await
        };

        let (first, reloaded) = futures::join!(cache.load(1), reload);

        assert_eq!((first.unwrap(), reloaded.unwrap()), (10, 10));
        assert_eq!(cache.loader().batches(), vec![vec![1]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn zero_delay_batches_until_the_next_yield() {
        let cache = BatchingCache::with_config(
            TimesTen::default(),
            LoaderConfig {
                batch_delay: Duration::ZERO,
                cache: true,
            },
        );

        let (one, two) = futures::join!(cache.load(1), cache.load(2));

        assert_eq!((one.unwrap(), two.unwrap()), (10, 20));
        assert_eq!(cache.loader().batches(), vec![vec![1, 2]]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn without_cache_only_coalesces() {
        let cache = BatchingCache::with_config(
            TimesTen::default(),
            LoaderConfig {
                cache: false,
                ..Default::default()
            },
        );

        let (one, again) = futures::join!(cache.load(1), cache.load(1));
        assert_eq!((one.unwrap(), again.unwrap()), (10, 10));

        assert_eq!(cache.load(1).await.unwrap(), 10);
        assert_eq!(cache.loader().batches(), vec![vec![1], vec![1]]);
    }
}
