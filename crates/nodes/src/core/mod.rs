// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! General purpose inputs, outputs and the stream packetizer.

use std::sync::Arc;
use tunekit_core::{Core, Result};

pub mod bytes_output;
pub mod file_read;
pub mod packetizer;
pub mod sink;

/// Registers the core modules.
///
/// The file input goes first so it keeps plain paths on a tie.
///
/// # Errors
///
/// Returns the first registration error.
pub fn register_core_modules(core: &Core, packetizer: &packetizer::PacketizerConfig) -> Result<()> {
    core.register_module(Arc::new(file_read::FileInputModule))?;
    core.register_module(Arc::new(packetizer::StreamPacketizerModule::new(packetizer.clone())))?;
    core.register_module(Arc::new(sink::NullOutputModule))?;
    core.register_module(Arc::new(bytes_output::MemoryOutputModule))?;
    Ok(())
}
