//! The per-block process step.
//!
//! Runs on the engine's real-time thread: no locks, no allocation, no
//! blocking I/O. The only system call is the non-blocking pipe write used to
//! wake the consumer or forward MIDI bytes.
use crossbeam_channel::Receiver;

use crate::backend::{Backend, BlockScope};
use crate::group::RtGroup;
use crate::midi::RtMidi;

/// Real-time halves travelling from the session to the process step.
pub(crate) enum Registration<B: Backend> {
    Group(RtGroup<B>),
    Midi(RtMidi<B>),
}

/// State owned by the engine callback.
pub struct Processor<B: Backend> {
    groups: Vec<RtGroup<B>>,
    midi: Vec<RtMidi<B>>,
    registrations: Receiver<Registration<B>>,
}

impl<B: Backend> Processor<B> {
    pub(crate) fn new(
        max_groups: usize,
        max_midi: usize,
        registrations: Receiver<Registration<B>>,
    ) -> Self {
        Self {
            groups: Vec::with_capacity(max_groups),
            midi: Vec::with_capacity(max_midi),
            registrations,
        }
    }

    /// Groups visible to the process step.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// MIDI channels visible to the process step.
    pub fn midi_count(&self) -> usize {
        self.midi.len()
    }

    /// Process one block: pick up new registrations, move audio for every
    /// group, then forward MIDI.
    pub fn process(&mut self, scope: &B::Scope) {
        self.accept_registrations();

        let frames = scope.n_frames();
        for group in &mut self.groups {
            group.process(scope, frames);
        }
        for channel in &mut self.midi {
            channel.forward(scope);
        }
    }

    fn accept_registrations(&mut self) {
        // The session never admits more than the reserved capacity, so these
        // pushes do not reallocate.
        while let Ok(registration) = self.registrations.try_recv() {
            match registration {
                Registration::Group(group) => self.groups.push(group),
                Registration::Midi(channel) => self.midi.push(channel),
            }
        }
    }
}
