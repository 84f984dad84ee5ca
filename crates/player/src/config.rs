// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Configuration for the decoder server.

use crate::constants::{
    DEFAULT_OUTPUT_NAME, DEFAULT_OUTPUT_TYPE, DEFAULT_POSITION_UPDATE_RANGE,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TIME_STAMP_UPDATE_QUANTUM_MS,
};
use serde::Deserialize;
use std::time::Duration;
use tunekit_nodes::BuiltinsConfig;

/// Settings for a [`Player`](crate::Player) and its server thread.
///
/// Every `Option` falls back to the matching constant in [`crate::constants`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecoderServerConfig {
    /// Time code notification granularity (default: 1000 ms)
    pub time_stamp_update_quantum_ms: Option<u64>,
    /// Range positions are rescaled to (default: 400)
    pub position_update_range: Option<u64>,
    /// Output used for `"!default"` and at startup (default: "null")
    pub default_output_name: Option<String>,
    /// Media type requested from the default output (default: "audio/pcm")
    pub default_output_type: Option<String>,
    /// How long shutdown waits for the server thread (default: 10000 ms)
    pub shutdown_timeout_ms: Option<u64>,
    /// Settings for the built-in modules the server registers at startup.
    pub builtins: BuiltinsConfig,
}

impl DecoderServerConfig {
    pub fn time_stamp_update_quantum_ms(&self) -> u64 {
        self.time_stamp_update_quantum_ms.unwrap_or(DEFAULT_TIME_STAMP_UPDATE_QUANTUM_MS)
    }

    pub fn position_update_range(&self) -> u64 {
        self.position_update_range.unwrap_or(DEFAULT_POSITION_UPDATE_RANGE)
    }

    pub fn default_output_name(&self) -> &str {
        self.default_output_name.as_deref().unwrap_or(DEFAULT_OUTPUT_NAME)
    }

    pub fn default_output_type(&self) -> &str {
        self.default_output_type.as_deref().unwrap_or(DEFAULT_OUTPUT_TYPE)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout_ms.map_or(DEFAULT_SHUTDOWN_TIMEOUT, Duration::from_millis)
    }

    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_stamp_update_quantum_ms == Some(0) {
            return Err("time_stamp_update_quantum_ms must be greater than 0".to_string());
        }
        if self.position_update_range == Some(0) {
            return Err("position_update_range must be greater than 0".to_string());
        }
        if self.default_output_name.as_deref().is_some_and(str::is_empty) {
            return Err("default_output_name must not be empty".to_string());
        }
        self.builtins.validate().map_err(|e| format!("builtins.{e}"))
    }
}
