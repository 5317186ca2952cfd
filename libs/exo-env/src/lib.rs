// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Access to configuration values supplied through environment variables.
//!
//! Code that needs configuration takes a `&dyn Environment`, so production code can pass
//! [`SystemEnvironment`] while tests pass a [`MapEnvironment`] with exactly the values they need.

mod map;

pub use map::MapEnvironment;

pub trait Environment: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn enabled(&self, key: &str, default_value: bool) -> Result<bool, EnvError> {
        match self.get(key) {
            Some(value) => match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "enabled" | "enable" => Ok(true),
                "false" | "0" | "no" | "off" | "disabled" | "disable" => Ok(false),
                _ => Err(EnvError::InvalidBoolean {
                    key: key.to_string(),
                    value,
                }),
            },
            None => Ok(default_value),
        }
    }

    /// Read a non-negative integer, falling back to `default_value` if the key is not set.
    fn get_u64(&self, key: &str, default_value: u64) -> Result<u64, EnvError> {
        match self.get(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| EnvError::InvalidNumber {
                    key: key.to_string(),
                    value,
                    message: e.to_string(),
                }),
            None => Ok(default_value),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(
        "Invalid value for {key}: {value}. Expected true, 1, yes, on, enabled, enable OR false, 0, no, off, disabled, disable"
    )]
    InvalidBoolean { key: String, value: String },

    #[error("Invalid value for {key}: {value}. Expected a non-negative integer ({message})")]
    InvalidNumber {
        key: String,
        value: String,
        message: String,
    },
}

pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}
