//! Named, id-tagged collections of audio ports.
use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::notify::Notifier;
use crate::port::{HostPort, PortDirection, PortStatus, RtPort};
use crate::stats::{GroupCounters, GroupStats};

/// Identifier handed out by [`Session::add_group`](crate::Session::add_group).
///
/// Ids grow monotonically within a session and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(u32);

impl GroupId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for GroupId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consumer-side half of a group.
pub struct Group {
    id: GroupId,
    name: String,
    ports: Vec<HostPort>,
    stats: Arc<GroupStats>,
}

impl Group {
    pub(crate) fn new(id: GroupId, name: String, ports: Vec<HostPort>, stats: Arc<GroupStats>) -> Self {
        Self {
            id,
            name,
            ports,
            stats,
        }
    }

    /// Group id.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Group name as given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ports in registration order.
    pub fn ports(&self) -> &[HostPort] {
        &self.ports
    }

    /// Number of ports of one direction.
    pub fn port_count(&self, direction: PortDirection) -> usize {
        self.ports
            .iter()
            .filter(|port| port.direction() == direction)
            .count()
    }

    /// Queue one sample per output port, in port order. Missing values are
    /// silence, surplus values are ignored. Returns how many ports accepted.
    pub(crate) fn write_frame(&mut self, samples: &[f32]) -> usize {
        let mut values = samples.iter().copied();
        let mut accepted = 0usize;
        for port in self
            .ports
            .iter_mut()
            .filter(|port| port.direction() == PortDirection::Output)
        {
            let sample = values.next().unwrap_or(0.0);
            if port.push_sample(sample) {
                accepted += 1;
            } else {
                self.stats.record_dropped_write();
            }
        }
        accepted
    }

    /// Take one sample per input port into `out`, silence on underrun.
    /// Returns the number of input ports; `out` beyond that is untouched.
    pub(crate) fn read_frame(&mut self, out: &mut [f32]) -> usize {
        let mut count = 0usize;
        for port in self
            .ports
            .iter_mut()
            .filter(|port| port.direction() == PortDirection::Input)
        {
            let sample = port.pop_sample().unwrap_or_else(|| {
                self.stats.record_silent_read();
                0.0
            });
            if let Some(slot) = out.get_mut(count) {
                *slot = sample;
            }
            count += 1;
        }
        count
    }

    /// Samples readable on every input port.
    pub(crate) fn pending_input(&self) -> usize {
        self.ports
            .iter()
            .filter(|port| port.direction() == PortDirection::Input)
            .map(HostPort::readable_samples)
            .min()
            .unwrap_or(0)
    }

    /// Samples writable on every output port.
    pub(crate) fn output_room(&self) -> usize {
        self.ports
            .iter()
            .filter(|port| port.direction() == PortDirection::Output)
            .map(HostPort::writable_samples)
            .min()
            .unwrap_or(0)
    }

    /// Live counters.
    pub fn counters(&self) -> GroupCounters {
        self.stats.snapshot()
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            id: self.id,
            name: self.name.clone(),
            inputs: self.port_count(PortDirection::Input),
            outputs: self.port_count(PortDirection::Output),
            ports: self.ports.iter().map(HostPort::status).collect(),
            counters: self.counters(),
        }
    }
}

/// Per-group diagnostics exposed to developer tooling.
#[derive(Clone, Debug)]
pub struct GroupStatus {
    /// Group id.
    pub id: GroupId,
    /// Group name.
    pub name: String,
    /// Input port count.
    pub inputs: usize,
    /// Output port count.
    pub outputs: usize,
    /// Ports in registration order.
    pub ports: Vec<PortStatus>,
    /// Counter snapshot.
    pub counters: GroupCounters,
}

impl GroupStatus {
    /// Average ring fill over the output ports, `0.0` when there are none.
    pub fn output_fill(&self) -> f32 {
        let fills: Vec<f32> = self
            .ports
            .iter()
            .filter(|port| port.direction == PortDirection::Output)
            .map(|port| port.fill)
            .collect();
        if fills.is_empty() {
            0.0
        } else {
            fills.iter().sum::<f32>() / fills.len() as f32
        }
    }
}

/// Real-time half of a group, owned by the process step.
pub(crate) struct RtGroup<B: Backend> {
    ports: Vec<RtPort<B>>,
    notifier: Notifier,
    stats: Arc<GroupStats>,
}

impl<B: Backend> RtGroup<B> {
    pub(crate) fn new(ports: Vec<RtPort<B>>, notifier: Notifier, stats: Arc<GroupStats>) -> Self {
        Self {
            ports,
            notifier,
            stats,
        }
    }

    pub(crate) fn into_ports(self) -> Vec<RtPort<B>> {
        self.ports
    }

    /// Move one block through every port, then wake the consumer once if any
    /// playback ring is running low.
    pub(crate) fn process(&mut self, scope: &B::Scope, frames: usize) {
        let mut need_data = false;
        for port in &mut self.ports {
            need_data |= port.transfer(scope, frames, &self.stats);
        }
        self.stats.record_block();
        if need_data {
            let delivered = self.notifier.signal();
            self.stats.record_need_data(delivered);
        }
    }
}
