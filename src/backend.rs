//! Seam between the multiplexer and the audio engine that drives it.
//!
//! A backend registers ports, activates the process step, and routes
//! connections. Inside the process step, ports hand out the engine's buffers
//! for the current block through the scope the engine passes in.
use crate::BridgeError;
use crate::process::Processor;

/// Per-block context handed to the process step by the engine.
pub trait BlockScope {
    /// Frames in the current block.
    fn n_frames(&self) -> usize;
}

/// Engine port whose block data flows into the multiplexer.
pub trait CapturePort<S>: Send {
    /// Run `f` over the engine samples of the current block.
    fn with_samples<R>(&self, scope: &S, f: impl FnOnce(&[f32]) -> R) -> R;
}

/// Engine port the multiplexer fills for playback.
pub trait PlaybackPort<S>: Send {
    /// Run `f` over the engine buffer of the current block.
    fn with_samples_mut<R>(&mut self, scope: &S, f: impl FnOnce(&mut [f32]) -> R) -> R;
}

/// Engine MIDI input delivering raw events per block.
pub trait MidiSource<S>: Send {
    /// Call `f` with the raw bytes of every event in the current block, in
    /// delivery order.
    fn for_each_event(&self, scope: &S, f: impl FnMut(&[u8]));
}

/// An audio engine client.
pub trait Backend: Sized {
    /// Block context type.
    type Scope: BlockScope;
    /// Input-direction audio port handle.
    type AudioIn: CapturePort<Self::Scope> + 'static;
    /// Output-direction audio port handle.
    type AudioOut: PlaybackPort<Self::Scope> + 'static;
    /// MIDI input port handle.
    type MidiIn: MidiSource<Self::Scope> + 'static;

    /// Engine sample rate in Hz.
    fn sample_rate(&self) -> usize;

    /// Nominal block length in frames.
    fn buffer_size(&self) -> usize;

    /// Register an audio port the engine writes into.
    fn register_audio_in(&mut self, name: &str) -> Result<Self::AudioIn, BridgeError>;

    /// Register an audio port the engine reads from.
    fn register_audio_out(&mut self, name: &str) -> Result<Self::AudioOut, BridgeError>;

    /// Register a MIDI input port.
    fn register_midi_in(&mut self, name: &str) -> Result<Self::MidiIn, BridgeError>;

    /// Remove a port registered with [`Backend::register_audio_in`].
    fn unregister_audio_in(&mut self, port: Self::AudioIn) -> Result<(), BridgeError>;

    /// Remove a port registered with [`Backend::register_audio_out`].
    fn unregister_audio_out(&mut self, port: Self::AudioOut) -> Result<(), BridgeError>;

    /// Remove a port registered with [`Backend::register_midi_in`].
    fn unregister_midi_in(&mut self, port: Self::MidiIn) -> Result<(), BridgeError>;

    /// Whether the process step is running.
    fn is_active(&self) -> bool;

    /// Hand the process step to the engine and start calling it once per block.
    fn activate(&mut self, processor: Processor<Self>) -> Result<(), BridgeError>;

    /// Connect two engine ports by full name.
    fn connect(&self, source: &str, destination: &str) -> Result<(), BridgeError>;

    /// Remove a connection between two engine ports.
    fn disconnect(&self, source: &str, destination: &str) -> Result<(), BridgeError>;
}
