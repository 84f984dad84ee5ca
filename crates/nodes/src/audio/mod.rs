// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Audio processing modules.

use tunekit_core::{Core, Result};

pub mod filters;

/// Registers all audio modules.
///
/// # Errors
///
/// Returns the first registration error.
pub fn register_audio_modules(core: &Core, gain: &filters::gain::GainControlConfig) -> Result<()> {
    filters::register_audio_filters(core, gain)
}
