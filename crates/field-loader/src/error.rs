// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use thiserror::Error;

/// Error returned by an [`EntityFetcher`](crate::EntityFetcher).
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a load.
///
/// Every caller waiting on a failed batch receives a clone of the same error.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("Batch load failed: {0}")]
    BatchFailed(Arc<dyn std::error::Error + Send + Sync>),

    #[error("Batch loader returned {actual} values for {expected} keys")]
    BatchSizeMismatch { expected: usize, actual: usize },
}

impl From<FetchError> for LoadError {
    fn from(error: FetchError) -> Self {
        LoadError::BatchFailed(error.into())
    }
}
