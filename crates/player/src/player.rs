// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Client handle for a decoder server thread.

use crate::config::DecoderServerConfig;
use crate::messages::{ClientMessage, DecoderCommand, PlayerEvent, PropertyScope, ServerMessage};
use crate::server::{DecoderServer, ServerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tunekit_core::{Core, Module, PropertyValue, Result, TimeCode, TuneKitError};

/// Wakes up a [`Player`] blocked in one of its pump methods. Cheap to clone
/// and usable from any thread.
#[derive(Debug, Clone)]
pub struct Interrupter {
    queue: mpsc::WeakUnboundedSender<ClientMessage>,
}

impl Interrupter {
    /// The next pump returns `None` once the events queued before this call
    /// have been delivered. Does nothing once the server is gone.
    pub fn interrupt(&self) {
        if let Some(queue) = self.queue.upgrade() {
            let _ = queue.send(ClientMessage::Wake);
        }
    }
}

/// Asynchronous player.
///
/// Every command method only enqueues a command for the server thread. Its
/// outcome arrives later as an ACK or NACK through the pump methods, along
/// with state, time and position notifications.
pub struct Player {
    server: Option<ServerHandle>,
    events: mpsc::UnboundedReceiver<ClientMessage>,
    interrupter: Interrupter,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("running", &self.server.is_some()).finish_non_exhaustive()
    }
}

impl Player {
    /// Starts a server thread on a fresh core.
    ///
    /// # Errors
    ///
    /// See [`Self::with_core`].
    pub fn new(config: &DecoderServerConfig) -> Result<Self> {
        Self::with_core(Core::new(), config)
    }

    /// Starts a server thread driving `core`.
    ///
    /// The built-in modules get registered on `core`, so it should not have
    /// them already. Keeping a clone of `core` lets the host install a key
    /// manager or look at what memory outputs received.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an invalid config, module registration errors,
    /// or `Io` if the thread cannot be spawned.
    pub fn with_core(core: Core, config: &DecoderServerConfig) -> Result<Self> {
        let (client_tx, events) = mpsc::unbounded_channel();
        let interrupter = Interrupter { queue: client_tx.downgrade() };
        let server = DecoderServer::spawn(core, config, client_tx)?;
        Ok(Self {
            server: Some(server),
            events,
            interrupter,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    fn send(&self, command: DecoderCommand) -> Result<()> {
        let server = self.server.as_ref().ok_or(TuneKitError::InvalidState)?;
        server.mailbox.send(ServerMessage::Command(command)).map_err(|_| TuneKitError::InvalidState)
    }

    /// Opens `name` (a path, a `file:` or `tcp://` URL...). An empty name closes the input.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the server is shut down. The same applies to every
    /// command method.
    pub fn set_input(&self, name: &str, media_type: Option<&str>) -> Result<()> {
        self.send(DecoderCommand::SetInput {
            name: name.to_string(),
            media_type: media_type.map(str::to_string),
        })
    }

    /// Installs an output. `None` removes it, `"!default"` picks the configured one.
    pub fn set_output(&self, name: Option<&str>, media_type: Option<&str>) -> Result<()> {
        self.send(DecoderCommand::SetOutput {
            name: name.map(str::to_string),
            media_type: media_type.map(str::to_string),
        })
    }

    pub fn play(&self) -> Result<()> {
        self.send(DecoderCommand::Play)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(DecoderCommand::Stop)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(DecoderCommand::Pause)
    }

    /// The server answers with a `Pong` carrying `cookie`, then an ACK.
    pub fn ping(&self, cookie: u64) -> Result<()> {
        self.send(DecoderCommand::Ping { cookie })
    }

    pub fn seek_to_time(&self, ms: u64) -> Result<()> {
        self.send(DecoderCommand::SeekToTime { ms })
    }

    /// Seeks to `h:m:s` plus `f` hundredths of a second.
    pub fn seek_to_time_stamp(&self, h: u8, m: u8, s: u8, f: u8) -> Result<()> {
        self.seek_to_time(TimeCode { h, m, s, f }.to_millis())
    }

    pub fn seek_to_position(&self, offset: u64, range: u64) -> Result<()> {
        self.send(DecoderCommand::SeekToPosition { offset, range })
    }

    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<()> {
        self.send(DecoderCommand::RegisterModule(module))
    }

    /// Adds the node created for `name` in front of the output.
    pub fn add_node(&self, name: &str) -> Result<()> {
        self.send(DecoderCommand::AddNode { name: name.to_string() })
    }

    /// Sets a core or stream property. A `None` value removes it.
    pub fn set_property(
        &self,
        scope: PropertyScope,
        target: Option<&str>,
        name: &str,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        self.send(DecoderCommand::SetProperty {
            scope,
            target: target.map(str::to_string),
            name: name.to_string(),
            value,
        })
    }

    /// Waits for the next event. `None` means an [`Interrupter`] woke us up.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the server is gone and every event was delivered.
    pub async fn pump_message(&mut self) -> Result<Option<PlayerEvent>> {
        match self.events.recv().await {
            Some(message) => Ok(into_event(message)),
            None => Err(TuneKitError::InvalidState),
        }
    }

    /// Like [`Self::pump_message`], giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// `Timeout` if nothing arrived in time, or `InvalidState` as for `pump_message`.
    pub async fn pump_message_timeout(&mut self, timeout: Duration) -> Result<Option<PlayerEvent>> {
        tokio::time::timeout(timeout, self.pump_message()).await.map_err(|_| TuneKitError::Timeout)?
    }

    /// Returns the next event if one is queued, without waiting.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the server is gone and every event was delivered.
    pub fn try_pump_message(&mut self) -> Result<Option<PlayerEvent>> {
        match self.events.try_recv() {
            Ok(message) => Ok(into_event(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TuneKitError::InvalidState),
        }
    }

    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Same as `self.interrupter().interrupt()`.
    pub fn interrupt(&self) {
        self.interrupter.interrupt();
    }

    /// Stops the server thread and waits for it to exit.
    ///
    /// Events posted before the thread exited can still be pumped afterwards.
    /// Calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// `Timeout` if the thread did not exit within the configured timeout (it
    /// is left detached), `Internal` if it panicked.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(server) = self.server.take() else {
            tracing::debug!("player already shut down");
            return Ok(());
        };
        tracing::info!("shutting down decoder server");
        // fails only if the thread already exited
        let _ = server.mailbox.send(ServerMessage::Terminate);

        // a panicking thread drops `done` unsent, the join below reports it
        if tokio::time::timeout(self.shutdown_timeout, server.done).await.is_err() {
            tracing::warn!(
                timeout_ms = self.shutdown_timeout.as_millis(),
                "decoder server did not shut down in time"
            );
            return Err(TuneKitError::Timeout);
        }

        server.thread.join().map_err(|_| {
            tracing::error!("decoder server thread panicked");
            TuneKitError::Internal("decoder server thread panicked".into())
        })?;
        tracing::debug!("decoder server shut down gracefully");
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            // the thread exits on its own, nobody waits for it
            let _ = server.mailbox.send(ServerMessage::Terminate);
        }
    }
}

fn into_event(message: ClientMessage) -> Option<PlayerEvent> {
    match message {
        ClientMessage::Event(event) => Some(event),
        ClientMessage::Wake => None,
    }
}
