// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Decoder server metrics.
//!
//! Instruments come from the global `opentelemetry` meter. Nothing is
//! exported unless the host application installs a meter provider.

use crate::constants::METER_NAME;
use crate::messages::{CommandKind, DecoderState};
use opentelemetry::metrics::Counter;
use opentelemetry::{global, KeyValue};

pub(crate) struct ServerMetrics {
    commands: Counter<u64>,
    state_transitions: Counter<u64>,
    packets_pumped: Counter<u64>,
}

impl ServerMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            commands: meter
                .u64_counter("decoder.commands")
                .with_description("Commands executed by the decoder server")
                .build(),
            state_transitions: meter
                .u64_counter("decoder.state_transitions")
                .with_description("Decoder state transitions")
                .build(),
            packets_pumped: meter
                .u64_counter("decoder.packets_pumped")
                .with_description("Successful packet pumps while playing")
                .build(),
        }
    }

    pub(crate) fn command(&self, command: CommandKind, ok: bool) {
        let result = if ok { "ack" } else { "nack" };
        self.commands
            .add(1, &[KeyValue::new("command", command.as_str()), KeyValue::new("result", result)]);
    }

    pub(crate) fn state_transition(&self, state: DecoderState) {
        self.state_transitions.add(1, &[KeyValue::new("state", state.as_str())]);
    }

    pub(crate) fn packet_pumped(&self) {
        self.packets_pumped.add(1, &[]);
    }
}
