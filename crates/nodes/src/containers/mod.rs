// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Container parsers.

use std::sync::Arc;
use tunekit_core::{Core, Result};

pub mod wav;

// Chain tests across the built-in modules
#[cfg(test)]
mod tests;

/// Registers the container parsers.
///
/// # Errors
///
/// Returns the first registration error.
pub fn register_container_modules(core: &Core) -> Result<()> {
    core.register_module(Arc::new(wav::WaveParserModule::new()))
}
