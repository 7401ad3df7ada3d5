//! Audio ports, each paired with one ring buffer.
//!
//! A port is created as two halves. The consumer keeps a [`HostPort`] with the
//! ring end it is allowed to touch; the process step gets an `RtPort` holding
//! the engine handle and the opposite ring end.
use std::fmt;

use crate::BridgeError;
use crate::backend::{Backend, CapturePort, PlaybackPort};
use crate::ring::{RingBuffer, RingConsumer, RingProducer, SAMPLE_BYTES};
use crate::stats::GroupStats;

/// Which way samples flow through a port, from the engine's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Engine block → ring → consumer.
    Input,
    /// Consumer → ring → engine block.
    Output,
}

impl PortDirection {
    /// Short tag used in port names.
    pub fn tag(self) -> &'static str {
        match self {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Engine-visible name of the `index`-th (1-based) port of a direction.
pub fn port_name(group: &str, direction: PortDirection, index: usize) -> String {
    format!("{group}-{}-{index}", direction.tag())
}

/// Every port of a group in registration order: inputs first, then outputs,
/// each numbered from 1.
pub fn group_port_names(group: &str, inputs: usize, outputs: usize) -> Vec<(PortDirection, String)> {
    let inputs = (1..=inputs).map(|i| (PortDirection::Input, port_name(group, PortDirection::Input, i)));
    let outputs =
        (1..=outputs).map(|i| (PortDirection::Output, port_name(group, PortDirection::Output, i)));
    inputs.chain(outputs).collect()
}

enum HostRing {
    Input(RingConsumer),
    Output(RingProducer),
}

/// Consumer-side half of a port.
pub struct HostPort {
    name: String,
    ring: HostRing,
}

impl HostPort {
    /// Engine-visible port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port direction.
    pub fn direction(&self) -> PortDirection {
        match self.ring {
            HostRing::Input(_) => PortDirection::Input,
            HostRing::Output(_) => PortDirection::Output,
        }
    }

    /// Bytes waiting in the ring.
    pub fn read_space(&self) -> usize {
        match &self.ring {
            HostRing::Input(ring) => ring.read_space(),
            HostRing::Output(ring) => ring.read_space(),
        }
    }

    /// Ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        match &self.ring {
            HostRing::Input(ring) => ring.capacity(),
            HostRing::Output(ring) => ring.capacity(),
        }
    }

    /// Samples the consumer could read now; `0` for output ports.
    pub fn readable_samples(&self) -> usize {
        match &self.ring {
            HostRing::Input(ring) => ring.read_space() / SAMPLE_BYTES,
            HostRing::Output(_) => 0,
        }
    }

    /// Samples the consumer could write now; `0` for input ports.
    pub fn writable_samples(&self) -> usize {
        match &self.ring {
            HostRing::Input(_) => 0,
            HostRing::Output(ring) => ring.write_space() / SAMPLE_BYTES,
        }
    }

    /// Queue one sample for playback. Returns `false` if the ring was full or
    /// this is an input port.
    pub(crate) fn push_sample(&mut self, sample: f32) -> bool {
        match &mut self.ring {
            HostRing::Output(ring) => {
                ring.write_space() >= SAMPLE_BYTES && ring.write_samples(&[sample]) == 1
            }
            HostRing::Input(_) => false,
        }
    }

    /// Take one captured sample, if a whole one is available.
    pub(crate) fn pop_sample(&mut self) -> Option<f32> {
        match &mut self.ring {
            HostRing::Input(ring) => {
                let mut sample = [0.0f32; 1];
                (ring.read_space() >= SAMPLE_BYTES && ring.read_samples(&mut sample) == 1)
                    .then_some(sample[0])
            }
            HostRing::Output(_) => None,
        }
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> PortStatus {
        let capacity = self.capacity();
        let buffered = self.read_space();
        PortStatus {
            name: self.name.clone(),
            direction: self.direction(),
            buffered_bytes: buffered,
            fill: if capacity == 0 {
                0.0
            } else {
                buffered as f32 / capacity as f32
            },
        }
    }
}

/// Per-port diagnostics.
#[derive(Clone, Debug)]
pub struct PortStatus {
    /// Engine-visible port name.
    pub name: String,
    /// Port direction.
    pub direction: PortDirection,
    /// Bytes currently queued in the ring.
    pub buffered_bytes: usize,
    /// Queued bytes as a fraction of capacity.
    pub fill: f32,
}

pub(crate) enum RtPort<B: Backend> {
    Capture { port: B::AudioIn, ring: RingProducer },
    Playback { port: B::AudioOut, ring: RingConsumer },
}

impl<B: Backend> RtPort<B> {
    /// Move one block between the engine buffer and the ring. Returns `true`
    /// when a playback ring holds less than two blocks.
    pub(crate) fn transfer(&mut self, scope: &B::Scope, frames: usize, stats: &GroupStats) -> bool {
        let block_bytes = frames * SAMPLE_BYTES;
        match self {
            RtPort::Playback { port, ring } => {
                let available = ring.read_space();
                if available >= block_bytes {
                    port.with_samples_mut(scope, |buffer| {
                        let n = frames.min(buffer.len());
                        ring.read_samples(&mut buffer[..n]);
                    });
                } else {
                    stats.record_underrun();
                }
                available < 2 * block_bytes
            }
            RtPort::Capture { port, ring } => {
                if ring.write_space() >= block_bytes {
                    port.with_samples(scope, |buffer| {
                        let n = frames.min(buffer.len());
                        ring.write_samples(&buffer[..n]);
                    });
                } else {
                    stats.record_overrun();
                }
                false
            }
        }
    }
}

/// Register one engine port and allocate its ring.
pub(crate) fn open_port<B: Backend>(
    backend: &mut B,
    direction: PortDirection,
    name: String,
    ring_capacity: usize,
) -> Result<(HostPort, RtPort<B>), BridgeError> {
    let (producer, consumer) = RingBuffer::new(ring_capacity).split();
    let (host, rt) = match direction {
        PortDirection::Input => {
            let port = backend.register_audio_in(&name)?;
            (
                HostRing::Input(consumer),
                RtPort::Capture {
                    port,
                    ring: producer,
                },
            )
        }
        PortDirection::Output => {
            let port = backend.register_audio_out(&name)?;
            (
                HostRing::Output(producer),
                RtPort::Playback {
                    port,
                    ring: consumer,
                },
            )
        }
    };
    Ok((HostPort { name, ring: host }, rt))
}

/// Unregister the engine port behind a real-time half that never went live.
pub(crate) fn close_port<B: Backend>(backend: &mut B, port: RtPort<B>) -> Result<(), BridgeError> {
    match port {
        RtPort::Capture { port, .. } => backend.unregister_audio_in(port),
        RtPort::Playback { port, .. } => backend.unregister_audio_out(port),
    }
}
