// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! TuneKit Player - Decoding on a dedicated thread.
//!
//! - [`decoder`]: a synchronous decoder, one core and one stream
//! - [`Player`]: the client handle that starts and drives a server thread
//! - [`messages`]: commands, replies and notifications
//! - [`config`] / [`constants`]: server settings and their defaults
//!
//! ## Quick Start
//!
//! ```ignore
//! use tunekit_player::{DecoderServerConfig, Player, PlayerEvent};
//!
//! let mut player = Player::new(&DecoderServerConfig::default())?;
//! player.set_input("/music/track.wav", None)?;
//! player.play()?;
//! while let Some(event) = player.pump_message().await? {
//!     if let PlayerEvent::DecoderState(DecoderState::Eos) = event {
//!         break;
//!     }
//! }
//! player.shutdown().await?;
//! ```

pub mod config;
pub mod constants;
pub mod decoder;
pub mod messages;
mod metrics;
pub mod player;
mod server;

#[cfg(test)]
mod tests;

pub use config::DecoderServerConfig;
pub use decoder::{Decoder, DecoderStatus};
pub use messages::{CommandKind, DecoderCommand, DecoderState, PlayerEvent, PropertyScope};
pub use player::{Interrupter, Player};
