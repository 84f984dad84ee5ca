// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! TuneKit Nodes - Built-in modules.
//!
//! - [`core`]: file input, stream packetizer, null and memory outputs
//! - [`containers`]: the WAV parser
//! - [`audio`]: the replay gain filter
//! - [`transport`]: `tcp://` input behind a buffered network stream

use serde::Deserialize;
use tunekit_core::{Core, Result, TuneKitError};

pub mod audio;
pub mod constants;
pub mod containers;
pub mod core;
#[cfg(feature = "tcp")]
pub mod transport;

#[cfg(test)]
pub mod test_utils;

/// Settings for every built-in module, typically loaded from a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuiltinsConfig {
    pub packetizer: core::packetizer::PacketizerConfig,
    pub gain: audio::filters::gain::GainControlConfig,
    #[cfg(feature = "tcp")]
    pub tcp: transport::tcp::TcpInputConfig,
}

impl BuiltinsConfig {
    /// # Errors
    ///
    /// Returns the first invalid section, prefixed with its name.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.packetizer.validate().map_err(|e| format!("packetizer: {e}"))?;
        #[cfg(feature = "tcp")]
        self.tcp.validate().map_err(|e| format!("tcp: {e}"))?;
        Ok(())
    }
}

/// Registers all built-in modules with default settings.
///
/// # Errors
///
/// Fails if a module with the same name is already registered.
pub fn register_builtins(core: &Core) -> Result<()> {
    register_builtins_with_config(core, &BuiltinsConfig::default())
}

/// Registers all built-in modules.
///
/// # Errors
///
/// `InvalidParameters` for an invalid config, or the first registration error.
pub fn register_builtins_with_config(core: &Core, config: &BuiltinsConfig) -> Result<()> {
    config.validate().map_err(TuneKitError::InvalidParameters)?;

    core::register_core_modules(core, &config.packetizer)?;
    containers::register_container_modules(core)?;
    audio::register_audio_modules(core, &config.gain)?;
    #[cfg(feature = "tcp")]
    transport::register_transport_modules(core, &config.tcp)?;

    tracing::info!(modules = core.modules().len(), "Finished registering built-in modules.");
    Ok(())
}
