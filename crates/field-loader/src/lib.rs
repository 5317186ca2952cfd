// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Batched, cached loading of entity fields.
//!
//! [`FieldLoader`] keeps one [`BatchingCache`] per entity, keyed by field name. Resolvers running
//! concurrently for the same entity ask for the fields they need; the loader fetches the union of
//! the fields not yet known in a single [`EntityFetcher::fetch`] call and hands each resolver its
//! own subset.

mod batching_cache;
mod config;
mod error;
mod field_loader;
mod field_value;

pub use batching_cache::{BatchLoader, BatchingCache};
pub use config::{EXO_LOADER_BATCH_DELAY_MS, EXO_LOADER_CACHE, LoaderConfig};
pub use error::{FetchError, LoadError};
pub use field_loader::{EntityFetcher, EntityFields, FieldLoader};
pub use field_value::{FieldValue, value_at_path};
