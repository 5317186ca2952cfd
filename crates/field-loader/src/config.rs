// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use exo_env::{EnvError, Environment};

/// How long (in milliseconds) a batch stays open for more keys. `0` closes it at the next yield.
pub const EXO_LOADER_BATCH_DELAY_MS: &str = "EXO_LOADER_BATCH_DELAY_MS";
/// Whether loaded values are kept once their batch completes.
pub const EXO_LOADER_CACHE: &str = "EXO_LOADER_CACHE";

const DEFAULT_BATCH_DELAY_MS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub batch_delay: Duration,
    /// With caching off, requests within one batch window are still coalesced, but nothing is
    /// remembered once the batch completes.
    pub cache: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            cache: true,
        }
    }
}

impl LoaderConfig {
    pub fn from_env(env: &dyn Environment) -> Result<Self, EnvError> {
        Ok(Self {
            batch_delay: Duration::from_millis(
                env.get_u64(EXO_LOADER_BATCH_DELAY_MS, DEFAULT_BATCH_DELAY_MS)?,
            ),
            cache: env.enabled(EXO_LOADER_CACHE, true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use exo_env::{MapEnvironment, SystemEnvironment};

    #[test]
    fn defaults() {
        let config = LoaderConfig::from_env(&MapEnvironment::new()).unwrap();

        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.batch_delay, Duration::from_millis(1));
        assert!(config.cache);
    }

    #[test]
    fn from_process_environment() {
        assert!(LoaderConfig::from_env(&SystemEnvironment).is_ok());
    }

    #[test]
    fn from_env() {
        let env = MapEnvironment::from([
            (EXO_LOADER_BATCH_DELAY_MS, "0"),
            (EXO_LOADER_CACHE, "false"),
        ]);

        assert_eq!(
            LoaderConfig::from_env(&env).unwrap(),
            LoaderConfig {
                batch_delay: Duration::ZERO,
                cache: false,
            }
        );
    }

    #[test]
    fn invalid_values() {
        let env = MapEnvironment::from([(EXO_LOADER_BATCH_DELAY_MS, "soon")]);
        assert!(matches!(
            LoaderConfig::from_env(&env),
            Err(EnvError::InvalidNumber { .. })
        ));

        let env = MapEnvironment::from([(EXO_LOADER_CACHE, "sometimes")]);
        assert!(matches!(
            LoaderConfig::from_env(&env),
            Err(EnvError::InvalidBoolean { .. })
        ));
    }
}
