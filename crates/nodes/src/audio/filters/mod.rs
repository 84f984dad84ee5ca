// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use tunekit_core::{Core, Result};

pub mod gain;
use gain::{GainControlConfig, GainControlFilterModule};

/// Registers the PCM filters.
///
/// # Errors
///
/// Returns the first registration error.
pub fn register_audio_filters(core: &Core, gain: &GainControlConfig) -> Result<()> {
    core.register_module(Arc::new(GainControlFilterModule::new(gain.clone())))
}
