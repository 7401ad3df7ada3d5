//! Session state: the groups, MIDI channels and engine client of one bridge.
use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use crate::BridgeError;
use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::group::{Group, GroupId, GroupStatus, RtGroup};
use crate::midi::{MidiChannel, MidiStatus, RtMidi, midi_port_name};
use crate::notify::{self, NotifyReceiver};
use crate::port::{PortDirection, RtPort, close_port, group_port_names, open_port};
use crate::process::{Processor, Registration};
use crate::stats::{GroupStats, MidiStats, monotonic_timestamp_ns};

/// One audio client with its groups and MIDI channels.
///
/// All methods run on the consumer side. The process step only ever sees the
/// real-time halves handed over at registration.
pub struct Session<B: Backend> {
    backend: B,
    config: SessionConfig,
    groups: BTreeMap<GroupId, Group>,
    midi: Vec<MidiChannel>,
    next_group_id: u32,
    registrations: Sender<Registration<B>>,
    pending: Option<Processor<B>>,
}

/// Session-wide diagnostics snapshot.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    /// Engine sample rate in Hz.
    pub sample_rate: usize,
    /// Block length in frames.
    pub buffer_size: usize,
    /// Duration of one block in milliseconds.
    pub latency_ms: f32,
    /// Whether the process step is running.
    pub active: bool,
    /// Groups in id order.
    pub groups: Vec<GroupStatus>,
    /// MIDI channels in registration order.
    pub midi: Vec<MidiStatus>,
}

impl<B: Backend> Session<B> {
    /// Wrap an opened engine client. Nothing runs until the first group is added.
    pub fn open(backend: B, config: SessionConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        // Pin the clock origin before the process step can touch it.
        monotonic_timestamp_ns();

        let (registrations, incoming) = bounded(config.max_groups + config.max_midi);
        let processor = Processor::new(config.max_groups, config.max_midi, incoming);
        info!(
            client = %config.client_name,
            sample_rate = backend.sample_rate(),
            buffer_size = backend.buffer_size(),
            "session opened"
        );
        Ok(Self {
            backend,
            config,
            groups: BTreeMap::new(),
            midi: Vec::new(),
            next_group_id: 0,
            registrations,
            pending: Some(processor),
        })
    }

    /// Register `inputs` input ports and `outputs` output ports under `name`.
    ///
    /// Returns the group's need-data receiver and its id. Activates the engine
    /// if it was not running yet; from then on the process step runs
    /// concurrently with everything the caller does.
    pub fn add_group(
        &mut self,
        name: &str,
        inputs: usize,
        outputs: usize,
    ) -> Result<(NotifyReceiver, GroupId), BridgeError> {
        if self.groups.len() >= self.config.max_groups {
            return Err(BridgeError::GroupLimit(self.config.max_groups));
        }

        let (notifier, receiver) = notify::channel()?;
        let stats = Arc::new(GroupStats::default());
        let mut host_ports = Vec::with_capacity(inputs + outputs);
        let mut rt_ports = Vec::with_capacity(inputs + outputs);
        for (direction, port_name) in group_port_names(name, inputs, outputs) {
            match open_port(
                &mut self.backend,
                direction,
                port_name,
                self.config.ring_capacity,
            ) {
                Ok((host, rt)) => {
                    host_ports.push(host);
                    rt_ports.push(rt);
                }
                Err(err) => {
                    self.release_ports(rt_ports);
                    return Err(err);
                }
            }
        }

        let registration = Registration::Group(RtGroup::new(rt_ports, notifier, Arc::clone(&stats)));
        if let Err(registration) = self.publish(registration) {
            if let Registration::Group(group) = registration {
                self.release_ports(group.into_ports());
            }
            return Err(BridgeError::ProcessStopped);
        }
        // A failed activation takes the process step, and this group's ports
        // with it, down together with the client.
        self.ensure_active()?;

        let id = GroupId::new(self.next_group_id);
        self.next_group_id += 1;
        self.groups
            .insert(id, Group::new(id, name.to_string(), host_ports, stats));
        info!(group = %id, name, inputs, outputs, "group registered");
        Ok((receiver, id))
    }

    /// Register a MIDI input port `{name}-in` whose events are forwarded to
    /// the returned receiver as raw bytes.
    pub fn add_midi(&mut self, name: &str) -> Result<NotifyReceiver, BridgeError> {
        if self.midi.len() >= self.config.max_midi {
            return Err(BridgeError::MidiLimit(self.config.max_midi));
        }

        let port_name = midi_port_name(name);
        let (notifier, receiver) = notify::channel()?;
        let port = self.backend.register_midi_in(&port_name)?;
        let stats = Arc::new(MidiStats::default());

        let registration = Registration::Midi(RtMidi::new(port, notifier, Arc::clone(&stats)));
        if let Err(registration) = self.publish(registration) {
            if let Registration::Midi(channel) = registration {
                if let Err(err) = self.backend.unregister_midi_in(channel.into_port()) {
                    warn!(port = %port_name, "failed to release port: {err}");
                }
            }
            return Err(BridgeError::ProcessStopped);
        }
        info!(name, port = %port_name, "midi channel registered");
        self.midi
            .push(MidiChannel::new(name.to_string(), port_name, stats));
        Ok(receiver)
    }

    /// Queue one sample per output port of the group, in port order.
    ///
    /// A port whose ring has no room drops its sample. Returns how many ports
    /// accepted one.
    pub fn write(&mut self, id: GroupId, samples: &[f32]) -> Result<usize, BridgeError> {
        Ok(self.group_mut(id)?.write_frame(samples))
    }

    /// Take one sample per input port of the group, in port order, with
    /// silence for ports whose ring is empty.
    pub fn read(&mut self, id: GroupId) -> Result<Vec<f32>, BridgeError> {
        let group = self.group_mut(id)?;
        let mut frame = vec![0.0f32; group.port_count(PortDirection::Input)];
        group.read_frame(&mut frame);
        Ok(frame)
    }

    /// Like [`Session::read`] without allocating. Returns the number of input
    /// ports; only the first `out.len()` of them are stored.
    pub fn read_into(&mut self, id: GroupId, out: &mut [f32]) -> Result<usize, BridgeError> {
        Ok(self.group_mut(id)?.read_frame(out))
    }

    /// Samples that can be read from every input port of the group.
    pub fn pending_input(&self, id: GroupId) -> Result<usize, BridgeError> {
        Ok(self.group_ref(id)?.pending_input())
    }

    /// Samples that can be written to every output port of the group.
    pub fn output_room(&self, id: GroupId) -> Result<usize, BridgeError> {
        Ok(self.group_ref(id)?.output_room())
    }

    /// Ask the engine to connect two ports.
    pub fn connect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        debug!(source, destination, "connect");
        self.backend
            .connect(source, destination)
            .inspect_err(|err| warn!(source, destination, "connect failed: {err}"))
    }

    /// Ask the engine to remove a connection.
    pub fn disconnect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        debug!(source, destination, "disconnect");
        self.backend
            .disconnect(source, destination)
            .inspect_err(|err| warn!(source, destination, "disconnect failed: {err}"))
    }

    /// Look up a group.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Groups in id order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// MIDI channels in registration order.
    pub fn midi_channels(&self) -> &[MidiChannel] {
        &self.midi
    }

    /// Engine sample rate in Hz.
    pub fn sample_rate(&self) -> usize {
        self.backend.sample_rate()
    }

    /// Block length in frames.
    pub fn buffer_size(&self) -> usize {
        self.backend.buffer_size()
    }

    /// Whether the process step is running.
    pub fn is_active(&self) -> bool {
        self.backend.is_active()
    }

    /// Configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Engine client.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Collect diagnostics for every group and MIDI channel.
    pub fn status(&self) -> SessionStatus {
        let sample_rate = self.sample_rate();
        let buffer_size = self.buffer_size();
        let latency_ms = if sample_rate == 0 {
            0.0
        } else {
            (buffer_size as f32 / sample_rate as f32) * 1_000.0
        };
        SessionStatus {
            sample_rate,
            buffer_size,
            latency_ms,
            active: self.is_active(),
            groups: self.groups.values().map(Group::status).collect(),
            midi: self.midi.iter().map(MidiChannel::status).collect(),
        }
    }

    fn group_ref(&self, id: GroupId) -> Result<&Group, BridgeError> {
        self.groups.get(&id).ok_or(BridgeError::UnknownGroup(id))
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut Group, BridgeError> {
        self.groups.get_mut(&id).ok_or(BridgeError::UnknownGroup(id))
    }

    /// Hand a registration to the process step, or give it back if the
    /// process step is gone.
    fn publish(&self, registration: Registration<B>) -> Result<(), Registration<B>> {
        // Limits keep the channel from filling; only a dead process step
        // ends up with the registration returned.
        self.registrations
            .try_send(registration)
            .map_err(TrySendError::into_inner)
    }

    fn release_ports(&mut self, ports: Vec<RtPort<B>>) {
        for port in ports {
            if let Err(err) = close_port(&mut self.backend, port) {
                warn!("failed to release port: {err}");
            }
        }
    }

    fn ensure_active(&mut self) -> Result<(), BridgeError> {
        if self.backend.is_active() {
            return Ok(());
        }
        let processor = self.pending.take().ok_or(BridgeError::ProcessStopped)?;
        self.backend.activate(processor)?;
        info!(client = %self.config.client_name, "engine activated");
        Ok(())
    }
}
