//! MIDI input channels. Event bytes are forwarded straight into a pipe; there
//! is no ring buffer on this path.
use std::sync::Arc;

use crate::backend::{Backend, MidiSource};
use crate::notify::Notifier;
use crate::stats::{MidiCounters, MidiStats};

/// Engine-visible name of a MIDI channel's input port.
pub fn midi_port_name(name: &str) -> String {
    format!("{name}-in")
}

/// Consumer-side record of a registered MIDI channel.
pub struct MidiChannel {
    name: String,
    port_name: String,
    stats: Arc<MidiStats>,
}

impl MidiChannel {
    pub(crate) fn new(name: String, port_name: String, stats: Arc<MidiStats>) -> Self {
        Self {
            name,
            port_name,
            stats,
        }
    }

    /// Channel name as given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine-visible port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> MidiStatus {
        MidiStatus {
            name: self.name.clone(),
            port_name: self.port_name.clone(),
            counters: self.stats.snapshot(),
        }
    }
}

/// Per-channel diagnostics.
#[derive(Clone, Debug)]
pub struct MidiStatus {
    /// Channel name.
    pub name: String,
    /// Engine-visible port name.
    pub port_name: String,
    /// Counter snapshot.
    pub counters: MidiCounters,
}

pub(crate) struct RtMidi<B: Backend> {
    port: B::MidiIn,
    notifier: Notifier,
    stats: Arc<MidiStats>,
}

impl<B: Backend> RtMidi<B> {
    pub(crate) fn new(port: B::MidiIn, notifier: Notifier, stats: Arc<MidiStats>) -> Self {
        Self {
            port,
            notifier,
            stats,
        }
    }

    pub(crate) fn into_port(self) -> B::MidiIn {
        self.port
    }

    /// Forward every event of the block, one write per event.
    pub(crate) fn forward(&mut self, scope: &B::Scope) {
        let notifier = &self.notifier;
        let stats = &self.stats;
        self.port.for_each_event(scope, |bytes| {
            if notifier.send(bytes) {
                stats.record_forwarded(bytes.len());
            } else {
                stats.record_dropped();
            }
        });
    }
}
