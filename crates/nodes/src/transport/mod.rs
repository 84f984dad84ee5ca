// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Network inputs and the buffering they share.

use std::sync::Arc;
use tunekit_core::{Core, Result};

pub mod network_stream;
pub mod tcp;

/// Registers the network input modules.
///
/// # Errors
///
/// Returns the first registration error.
pub fn register_transport_modules(core: &Core, config: &tcp::TcpInputConfig) -> Result<()> {
    core.register_module(Arc::new(tcp::TcpInputModule::new(config.clone())))
}
