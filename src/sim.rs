//! In-process engine that runs the process step on demand.
//!
//! [`SimBackend`] stands in for a JACK client: it owns a table of port buffers
//! and a connection list, and keeps the process step once activated. A cloned
//! [`SimEngine`] handle plays the server's role, filling capture buffers,
//! running blocks, and inspecting playback buffers. The session tests and
//! `jackmuxctl --simulate` both run on it.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::BridgeError;
use crate::backend::{Backend, BlockScope, CapturePort, MidiSource, PlaybackPort};
use crate::process::Processor;

/// Sample rate of [`SimBackend::default`].
pub const DEFAULT_SAMPLE_RATE: usize = 48_000;
/// Block length of [`SimBackend::default`].
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Ports every simulated server exposes, mirroring a stereo sound card.
pub const SYSTEM_PORTS: [&str; 4] = [
    "system:capture_1",
    "system:capture_2",
    "system:playback_1",
    "system:playback_2",
];

type SampleBuffer = Arc<Mutex<Vec<f32>>>;
type EventQueue = Arc<Mutex<Vec<Vec<u8>>>>;

/// Block context of the simulated engine.
#[derive(Clone, Copy, Debug)]
pub struct SimScope {
    frames: usize,
}

impl BlockScope for SimScope {
    fn n_frames(&self) -> usize {
        self.frames
    }
}

/// Simulated capture port.
pub struct SimAudioIn {
    name: String,
    buffer: SampleBuffer,
}

impl CapturePort<SimScope> for SimAudioIn {
    fn with_samples<R>(&self, _scope: &SimScope, f: impl FnOnce(&[f32]) -> R) -> R {
        f(&self.buffer.lock())
    }
}

/// Simulated playback port.
pub struct SimAudioOut {
    name: String,
    buffer: SampleBuffer,
}

impl PlaybackPort<SimScope> for SimAudioOut {
    fn with_samples_mut<R>(&mut self, _scope: &SimScope, f: impl FnOnce(&mut [f32]) -> R) -> R {
        f(&mut self.buffer.lock())
    }
}

/// Simulated MIDI input port.
pub struct SimMidiIn {
    name: String,
    events: EventQueue,
}

impl MidiSource<SimScope> for SimMidiIn {
    fn for_each_event(&self, _scope: &SimScope, mut f: impl FnMut(&[u8])) {
        for event in self.events.lock().iter() {
            f(event);
        }
    }
}

#[derive(Clone)]
enum SimPort {
    /// Port owned by another client; routable but carries no data here.
    External,
    AudioIn(SampleBuffer),
    AudioOut(SampleBuffer),
    MidiIn(EventQueue),
}

struct SimGraph {
    sample_rate: usize,
    buffer_size: usize,
    ports: Mutex<HashMap<String, SimPort>>,
    connections: Mutex<Vec<(String, String)>>,
    processor: Mutex<Option<Processor<SimBackend>>>,
    active: AtomicBool,
}

impl SimGraph {
    fn port(&self, name: &str) -> Result<SimPort, BridgeError> {
        self.ports
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownPort(name.to_string()))
    }

    fn insert_port(&self, name: &str, port: SimPort) -> Result<(), BridgeError> {
        let mut ports = self.ports.lock();
        if ports.contains_key(name) {
            return Err(BridgeError::DuplicatePort(name.to_string()));
        }
        ports.insert(name.to_string(), port);
        Ok(())
    }

    /// Drop the process step; its pipe ends close with it.
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.processor.lock().take();
    }

    fn remove_port(&self, name: &str) -> Result<(), BridgeError> {
        self.ports
            .lock()
            .remove(name)
            .ok_or_else(|| BridgeError::UnknownPort(name.to_string()))?;
        self.connections
            .lock()
            .retain(|(src, dst)| src != name && dst != name);
        Ok(())
    }
}

/// Simulated engine client.
pub struct SimBackend {
    graph: Arc<SimGraph>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_BUFFER_SIZE)
    }
}

impl SimBackend {
    /// Engine running at `sample_rate` with blocks of `buffer_size` frames.
    pub fn new(sample_rate: usize, buffer_size: usize) -> Self {
        let ports = SYSTEM_PORTS
            .iter()
            .map(|name| (name.to_string(), SimPort::External))
            .collect();
        Self {
            graph: Arc::new(SimGraph {
                sample_rate,
                buffer_size,
                ports: Mutex::new(ports),
                connections: Mutex::new(Vec::new()),
                processor: Mutex::new(None),
                active: AtomicBool::new(false),
            }),
        }
    }

    /// Handle that drives this engine.
    pub fn engine(&self) -> SimEngine {
        SimEngine {
            graph: Arc::clone(&self.graph),
        }
    }

    fn register_buffer(
        &self,
        name: &str,
        wrap: fn(SampleBuffer) -> SimPort,
    ) -> Result<SampleBuffer, BridgeError> {
        let buffer: SampleBuffer = Arc::new(Mutex::new(vec![0.0; self.graph.buffer_size]));
        self.graph.insert_port(name, wrap(Arc::clone(&buffer)))?;
        Ok(buffer)
    }

    fn routing_check(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        for name in [source, destination] {
            self.graph.port(name)?;
        }
        Ok(())
    }
}

impl Backend for SimBackend {
    type Scope = SimScope;
    type AudioIn = SimAudioIn;
    type AudioOut = SimAudioOut;
    type MidiIn = SimMidiIn;

    fn sample_rate(&self) -> usize {
        self.graph.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.graph.buffer_size
    }

    fn register_audio_in(&mut self, name: &str) -> Result<SimAudioIn, BridgeError> {
        let buffer = self.register_buffer(name, SimPort::AudioIn)?;
        Ok(SimAudioIn {
            name: name.to_string(),
            buffer,
        })
    }

    fn register_audio_out(&mut self, name: &str) -> Result<SimAudioOut, BridgeError> {
        let buffer = self.register_buffer(name, SimPort::AudioOut)?;
        Ok(SimAudioOut {
            name: name.to_string(),
            buffer,
        })
    }

    fn register_midi_in(&mut self, name: &str) -> Result<SimMidiIn, BridgeError> {
        let events: EventQueue = Arc::new(Mutex::new(Vec::new()));
        self.graph
            .insert_port(name, SimPort::MidiIn(Arc::clone(&events)))?;
        Ok(SimMidiIn {
            name: name.to_string(),
            events,
        })
    }

    fn unregister_audio_in(&mut self, port: SimAudioIn) -> Result<(), BridgeError> {
        self.graph.remove_port(&port.name)
    }

    fn unregister_audio_out(&mut self, port: SimAudioOut) -> Result<(), BridgeError> {
        self.graph.remove_port(&port.name)
    }

    fn unregister_midi_in(&mut self, port: SimMidiIn) -> Result<(), BridgeError> {
        self.graph.remove_port(&port.name)
    }

    fn is_active(&self) -> bool {
        self.graph.active.load(Ordering::Acquire)
    }

    fn activate(&mut self, processor: Processor<Self>) -> Result<(), BridgeError> {
        let mut slot = self.graph.processor.lock();
        if slot.is_some() {
            return Err(BridgeError::AlreadyActive);
        }
        *slot = Some(processor);
        self.graph.active.store(true, Ordering::Release);
        Ok(())
    }

    fn connect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        self.routing_check(source, destination)?;
        let mut connections = self.graph.connections.lock();
        if connections
            .iter()
            .any(|(src, dst)| src == source && dst == destination)
        {
            return Err(BridgeError::RoutingRejected {
                source_port: source.to_string(),
                destination_port: destination.to_string(),
                reason: "already connected",
            });
        }
        connections.push((source.to_string(), destination.to_string()));
        Ok(())
    }

    fn disconnect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        self.routing_check(source, destination)?;
        let mut connections = self.graph.connections.lock();
        match connections
            .iter()
            .position(|(src, dst)| src == source && dst == destination)
        {
            Some(index) => {
                connections.remove(index);
                Ok(())
            }
            None => Err(BridgeError::RoutingRejected {
                source_port: source.to_string(),
                destination_port: destination.to_string(),
                reason: "not connected",
            }),
        }
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        self.graph.deactivate();
    }
}

/// Server-side handle of a [`SimBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct SimEngine {
    graph: Arc<SimGraph>,
}

impl SimEngine {
    /// Block length in frames.
    pub fn buffer_size(&self) -> usize {
        self.graph.buffer_size
    }

    /// Engine sample rate in Hz.
    pub fn sample_rate(&self) -> usize {
        self.graph.sample_rate
    }

    /// Run one full-length block. Returns `false` if the client is not active.
    pub fn run_block(&self) -> bool {
        self.run_frames(self.graph.buffer_size)
    }

    /// Run one block of `frames` frames, at most the buffer size. MIDI events
    /// queued before the call are consumed by it.
    pub fn run_frames(&self, frames: usize) -> bool {
        let scope = SimScope {
            frames: frames.min(self.graph.buffer_size),
        };
        let ran = match self.graph.processor.lock().as_mut() {
            Some(processor) => {
                processor.process(&scope);
                true
            }
            None => false,
        };
        for port in self.graph.ports.lock().values() {
            if let SimPort::MidiIn(events) = port {
                events.lock().clear();
            }
        }
        ran
    }

    /// Store `samples` in a capture port's buffer, zero-padded to a block.
    pub fn set_input(&self, port: &str, samples: &[f32]) -> Result<(), BridgeError> {
        match self.graph.port(port)? {
            SimPort::AudioIn(buffer) => {
                let mut buffer = buffer.lock();
                buffer.fill(0.0);
                let n = samples.len().min(buffer.len());
                buffer[..n].copy_from_slice(&samples[..n]);
                Ok(())
            }
            _ => Err(BridgeError::UnknownPort(port.to_string())),
        }
    }

    /// Overwrite every sample of a playback port's buffer with `value`.
    pub fn fill_output(&self, port: &str, value: f32) -> Result<(), BridgeError> {
        self.playback_buffer(port)?.lock().fill(value);
        Ok(())
    }

    /// Current contents of a playback port's buffer.
    pub fn output(&self, port: &str) -> Result<Vec<f32>, BridgeError> {
        Ok(self.playback_buffer(port)?.lock().clone())
    }

    /// Queue one raw event for the next block on a MIDI input port.
    pub fn push_midi(&self, port: &str, bytes: &[u8]) -> Result<(), BridgeError> {
        match self.graph.port(port)? {
            SimPort::MidiIn(events) => {
                events.lock().push(bytes.to_vec());
                Ok(())
            }
            _ => Err(BridgeError::UnknownPort(port.to_string())),
        }
    }

    /// Add a port owned by some other client, so it can be routed to.
    pub fn add_external_port(&self, name: &str) -> Result<(), BridgeError> {
        self.graph.insert_port(name, SimPort::External)
    }

    /// Every known port name, sorted.
    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graph.ports.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current connections in the order they were made.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.graph.connections.lock().clone()
    }

    /// Stop running the client's process step, as a server shutdown would.
    pub fn shutdown(&self) {
        self.graph.deactivate();
    }

    /// Whether a client has handed over its process step.
    pub fn is_active(&self) -> bool {
        self.graph.active.load(Ordering::Acquire)
    }

    /// Run blocks on a background thread at roughly the engine's real pace.
    pub fn spawn_clock(&self) -> SimClock {
        let engine = self.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let period = Duration::from_secs_f64(
            self.graph.buffer_size as f64 / self.graph.sample_rate.max(1) as f64,
        );
        let handle = thread::spawn(move || {
            debug!(?period, "simulated clock started");
            while flag.load(Ordering::Relaxed) {
                engine.run_block();
                thread::sleep(period);
            }
            debug!("simulated clock stopped");
        });
        SimClock {
            running,
            handle: Some(handle),
        }
    }

    fn playback_buffer(&self, port: &str) -> Result<SampleBuffer, BridgeError> {
        match self.graph.port(port)? {
            SimPort::AudioOut(buffer) => Ok(buffer),
            _ => Err(BridgeError::UnknownPort(port.to_string())),
        }
    }
}

/// Background block clock; stops and joins when dropped.
pub struct SimClock {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for SimClock {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
