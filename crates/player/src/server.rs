// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The decoder server thread.
//!
//! The server owns a [`Decoder`] and runs it on a dedicated thread. It
//! executes commands from its mailbox in order, pumps packets while
//! playing, and posts replies and notifications to the player's queue.
//!
//! ## Scheduling
//!
//! ```text
//! loop:
//!     drain the mailbox (non-blocking)
//!     if playing: pump one packet, update the status
//!     else:       block until the next message
//! ```
//!
//! Every notification caused by a command is posted before the command's
//! ACK or NACK.

use crate::config::DecoderServerConfig;
use crate::constants::{DEFAULT_OUTPUT_ALIAS, SERVER_THREAD_NAME};
use crate::decoder::Decoder;
use crate::messages::{
    ClientMessage, CommandKind, DecoderCommand, DecoderState, PlayerEvent, PropertyScope,
    ServerMessage,
};
use crate::metrics::ServerMetrics;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tunekit_core::context::StreamPosition;
use tunekit_core::properties::{ListenerId, PropertyChange};
use tunekit_core::{
    Core, PropertyValue, Result, StreamEvent, TimeCode, TimeStamp, TuneKitError,
};

/// The player's side of a running server.
pub(crate) struct ServerHandle {
    pub(crate) mailbox: mpsc::UnboundedSender<ServerMessage>,
    pub(crate) thread: std::thread::JoinHandle<()>,
    /// Resolves when the thread leaves its loop. Dropped without a value on panic.
    pub(crate) done: oneshot::Receiver<()>,
}

struct PropertyWatch {
    scope: PropertyScope,
    id: ListenerId,
    changes: mpsc::UnboundedReceiver<PropertyChange>,
}

pub(crate) struct DecoderServer {
    decoder: Decoder,
    mailbox: mpsc::UnboundedReceiver<ServerMessage>,
    client: mpsc::UnboundedSender<ClientMessage>,
    stream_events: mpsc::UnboundedReceiver<StreamEvent>,
    property_watches: [PropertyWatch; 2],
    state: DecoderState,
    time_stamp_update_quantum_ms: u64,
    position_update_range: u64,
    /// Last notified (quantized) time.
    time_stamp_ms: u64,
    /// Last notified position.
    position: StreamPosition,
    metrics: ServerMetrics,
}

impl DecoderServer {
    /// Sets up a decoder on `core` and starts the server thread.
    ///
    /// The built-in modules are registered on `core` and the default output
    /// is installed before the thread starts.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an invalid config, any registration or output
    /// error, or `Io` if the thread cannot be spawned.
    pub(crate) fn spawn(
        core: Core,
        config: &DecoderServerConfig,
        client: mpsc::UnboundedSender<ClientMessage>,
    ) -> Result<ServerHandle> {
        config.validate().map_err(TuneKitError::InvalidParameters)?;

        let mut decoder = Decoder::with_core(core);
        decoder.set_default_output(config.default_output_name(), config.default_output_type());
        decoder.register_builtins(&config.builtins)?;
        decoder.set_output(Some(DEFAULT_OUTPUT_ALIAS), None)?;

        let (events_tx, stream_events) = mpsc::unbounded_channel();
        decoder.set_event_listener(Some(events_tx));
        let property_watches = [
            watch(PropertyScope::Core, &decoder),
            watch(PropertyScope::Stream, &decoder),
        ];

        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let position_update_range = config.position_update_range();
        let server = Self {
            decoder,
            mailbox,
            client,
            stream_events,
            property_watches,
            state: DecoderState::Stopped,
            time_stamp_update_quantum_ms: config.time_stamp_update_quantum_ms(),
            position_update_range,
            time_stamp_ms: 0,
            position: StreamPosition { offset: 0, range: position_update_range },
            metrics: ServerMetrics::new(),
        };

        let (done_tx, done) = oneshot::channel();
        let thread = std::thread::Builder::new().name(SERVER_THREAD_NAME.to_string()).spawn(
            move || {
                server.run();
                let _ = done_tx.send(());
            },
        )?;
        Ok(ServerHandle { mailbox: mailbox_tx, thread, done })
    }

    fn run(mut self) {
        tracing::info!("DecoderServer started");
        self.post(PlayerEvent::DecoderState(self.state));
        self.post(PlayerEvent::StreamTimeCode(TimeCode::from(TimeStamp::from_millis(
            self.time_stamp_ms,
        ))));
        self.post(PlayerEvent::StreamPosition(self.position));

        'run: loop {
            loop {
                match self.mailbox.try_recv() {
                    Ok(message) => {
                        if !self.handle_message(message) {
                            break 'run;
                        }
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'run,
                }
            }

            if self.state == DecoderState::Playing {
                self.pump();
            } else {
                match self.mailbox.blocking_recv() {
                    Some(message) => {
                        if !self.handle_message(message) {
                            break;
                        }
                    },
                    None => break,
                }
            }
        }

        self.decoder.set_event_listener(None);
        for watch in &self.property_watches {
            match watch.scope {
                PropertyScope::Core => self.decoder.properties().remove_listener(watch.id),
                _ => self.decoder.stream_properties().remove_listener(watch.id),
            };
        }
        tracing::info!("DecoderServer shutting down");
    }

    /// Returns `false` when the thread should exit.
    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Command(command) => {
                self.handle_command(command);
                true
            },
            ServerMessage::Terminate => {
                tracing::debug!("terminate requested");
                false
            },
        }
    }

    fn handle_command(&mut self, command: DecoderCommand) {
        let kind = command.kind();
        tracing::debug!(?command, "executing command");

        let result = match command {
            DecoderCommand::SetInput { name, media_type } => {
                let result = self.decoder.set_input(&name, media_type.as_deref());
                if self.state == DecoderState::Eos {
                    self.set_state(DecoderState::Stopped);
                }
                self.update_status();
                result
            },
            DecoderCommand::SetOutput { name, media_type } => {
                self.decoder.set_output(name.as_deref(), media_type.as_deref())
            },
            DecoderCommand::Play => {
                self.set_state(DecoderState::Playing);
                Ok(())
            },
            DecoderCommand::Stop => {
                self.decoder.stop();
                self.set_state(DecoderState::Stopped);
                Ok(())
            },
            DecoderCommand::Pause => {
                self.decoder.pause();
                self.set_state(DecoderState::Paused);
                Ok(())
            },
            DecoderCommand::Ping { cookie } => {
                self.post(PlayerEvent::Pong { cookie });
                Ok(())
            },
            DecoderCommand::SeekToTime { ms } => {
                let result = self.decoder.seek_to_time(ms);
                self.after_seek(&result);
                result
            },
            DecoderCommand::SeekToPosition { offset, range } => {
                let result = self.decoder.seek_to_position(offset, range);
                self.after_seek(&result);
                result
            },
            DecoderCommand::RegisterModule(module) => self.decoder.register_module(module),
            DecoderCommand::AddNode { name } => self.decoder.add_node_by_name(&name).map(|_| ()),
            DecoderCommand::SetProperty { scope, target, name, value } => {
                self.set_property(scope, target.as_deref(), &name, value)
            },
        };

        self.forward_notifications();
        self.reply(kind, result);
    }

    fn after_seek(&mut self, result: &Result<()>) {
        if result.is_ok() {
            self.update_status();
            if self.state == DecoderState::Eos {
                self.set_state(DecoderState::Stopped);
            }
        }
    }

    fn set_property(
        &self,
        scope: PropertyScope,
        target: Option<&str>,
        name: &str,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        let properties = match scope {
            PropertyScope::Core => self.decoder.properties(),
            PropertyScope::Stream => self.decoder.stream_properties(),
            PropertyScope::Module => return Err(TuneKitError::NotSupported),
        };
        tracing::debug!(scope = scope.as_str(), ?target, name, "setting property");
        match value {
            Some(value) => properties.set(name, value),
            None => {
                properties.unset(name);
            },
        }
        Ok(())
    }

    fn pump(&mut self) {
        let result = self.decoder.pump_packet();
        self.forward_notifications();
        match result {
            Ok(()) => {
                self.metrics.packet_pumped();
                self.update_status();
            },
            Err(e) => {
                tracing::debug!(error = %e, "pump failed, end of stream");
                self.set_state(DecoderState::Eos);
            },
        }
    }

    fn set_state(&mut self, state: DecoderState) {
        if state == self.state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "decoder state changed");
        self.state = state;
        self.metrics.state_transition(state);
        self.post(PlayerEvent::DecoderState(state));
    }

    /// Posts the time and position when they moved enough to be worth it.
    fn update_status(&mut self) {
        let status = self.decoder.status();

        let ms = status.time_stamp.to_millis();
        let quantized = ms - ms % self.time_stamp_update_quantum_ms;
        if quantized != self.time_stamp_ms {
            self.time_stamp_ms = quantized;
            let time_code = TimeCode::from(TimeStamp::from_millis(quantized));
            self.post(PlayerEvent::StreamTimeCode(time_code));
        }

        let ratio = status.position.range / self.position_update_range;
        let offset = if ratio == 0 { 0 } else { status.position.offset / ratio };
        if offset != self.position.offset {
            self.position.offset = offset;
            self.post(PlayerEvent::StreamPosition(self.position));
        }
    }

    fn forward_notifications(&mut self) {
        while let Ok(event) = self.stream_events.try_recv() {
            match event {
                StreamEvent::Info { update_mask, info } => {
                    self.post(PlayerEvent::StreamInfo { update_mask, info });
                },
                StreamEvent::Topology { change, node, name } => {
                    tracing::trace!(?change, %node, module = %name, "stream topology changed");
                },
            }
        }

        let mut changes = Vec::new();
        for watch in &mut self.property_watches {
            while let Ok(change) = watch.changes.try_recv() {
                changes.push(PlayerEvent::Property {
                    scope: watch.scope,
                    source: None,
                    name: change.name,
                    value: change.value,
                });
            }
        }
        for change in changes {
            self.post(change);
        }
    }

    fn reply(&self, command: CommandKind, result: Result<()>) {
        self.metrics.command(command, result.is_ok());
        let event = match result {
            Ok(()) => PlayerEvent::Ack { command },
            Err(error) => {
                tracing::debug!(%command, %error, "command failed");
                PlayerEvent::Nack { command, error }
            },
        };
        self.post(event);
    }

    fn post(&self, event: PlayerEvent) {
        if self.client.send(ClientMessage::Event(event)).is_err() {
            tracing::trace!("player is gone, dropping notification");
        }
    }
}

fn watch(scope: PropertyScope, decoder: &Decoder) -> PropertyWatch {
    let properties = match scope {
        PropertyScope::Core => decoder.properties(),
        _ => decoder.stream_properties(),
    };
    let (id, changes) = properties.add_listener(None);
    PropertyWatch { scope, id, changes }
}
