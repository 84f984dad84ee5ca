// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Default values for the decoder server and the player.
//!
//! [`DecoderServerConfig`](crate::config::DecoderServerConfig) resolves its
//! optional overrides against these constants.

use std::time::Duration;

// === Status Notifications ===

/// Granularity of time code notifications, in milliseconds.
///
/// The current time is rounded down to a multiple of this value and a
/// notification is only posted when the rounded value changes. With the
/// default of one second, a player UI gets one update per displayed second.
pub const DEFAULT_TIME_STAMP_UPDATE_QUANTUM_MS: u64 = 1000;

/// Range of the position reported in notifications.
///
/// Positions are rescaled from the stream's own range (usually its byte size)
/// to `0..=DEFAULT_POSITION_UPDATE_RANGE`, which is what a progress slider needs.
pub const DEFAULT_POSITION_UPDATE_RANGE: u64 = 400;

// === Output ===

/// Output module used when the client does not pick one.
pub const DEFAULT_OUTPUT_NAME: &str = tunekit_core::stream::DEFAULT_OUTPUT_NAME;

/// Media type requested from the default output.
pub const DEFAULT_OUTPUT_TYPE: &str = tunekit_core::stream::DEFAULT_OUTPUT_TYPE;

/// Output name that stands for the configured default output.
pub const DEFAULT_OUTPUT_ALIAS: &str = "!default";

// === Lifecycle ===

/// How long `Player::shutdown` waits for the server thread.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the server thread, as shown by debuggers and `top -H`.
pub const SERVER_THREAD_NAME: &str = "decoder-server";

/// Name of the `opentelemetry` meter used by the server.
pub const METER_NAME: &str = "tunekit_player";
