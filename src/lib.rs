#![deny(missing_docs)]

//! Real-time safe port multiplexer between a JACK process callback and a
//! non-real-time consumer.
//!
//! A [`Session`] owns named groups of audio ports. Every port is paired with a
//! lock-free [`RingBuffer`](ring::RingBuffer); the process step moves one block
//! per port between the engine buffers and the rings, and writes a single wake
//! byte to the group's pipe when an output ring holds less than two blocks.
//! MIDI input events are forwarded verbatim into a pipe per channel. The
//! process step never blocks, allocates or locks.
//!
//! Ring full/empty conditions are not errors: writes are dropped, reads fall
//! back to silence, and the counters in [`stats`] record what was lost.
//!
//! Pipes are plain Unix file descriptors, so the crate targets Unix only.

use std::sync::Once;

pub mod backend;
pub mod config;
/// Developer-facing control and TUI support.
pub mod control;
pub mod group;
pub mod jack_backend;
pub mod midi;
pub mod notify;
pub mod port;
pub mod process;
pub mod ring;
pub mod session;
pub mod sim;
pub mod stats;

#[cfg(test)]
mod tests;

pub use backend::Backend;
pub use config::SessionConfig;
pub use group::{GroupId, GroupStatus};
pub use jack_backend::{JackBackend, open_session};
pub use notify::NotifyReceiver;
pub use port::PortDirection;
pub use session::{Session, SessionStatus};

static TRACING_INIT: Once = Once::new();

/// Install the fmt subscriber once per process. Later calls are no-ops, as is
/// the first call when the host already installed a subscriber.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Error enumeration surfaced across the public API.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// The audio server refused the client.
    #[error("error creating jack client '{name}': {source}")]
    ClientOpen {
        /// Requested client name.
        name: String,
        /// Engine status.
        source: jack::Error,
    },
    /// The engine client was lost after a failed activation.
    #[error("jack client is closed")]
    ClientClosed,
    /// Port registration was refused by the engine.
    #[error("failed to register port '{port}': {source}")]
    PortRegistration {
        /// Requested port name.
        port: String,
        /// Engine status.
        source: jack::Error,
    },
    /// The engine refused to remove a port.
    #[error("failed to unregister port '{port}': {source}")]
    PortUnregistration {
        /// Port name.
        port: String,
        /// Engine status.
        source: jack::Error,
    },
    /// The simulated engine already has a port of this name.
    #[error("port '{0}' already exists")]
    DuplicatePort(String),
    /// The engine refused to start the process step.
    #[error("failed to activate client: {0}")]
    Activation(#[source] jack::Error),
    /// The process step was already handed to the engine.
    #[error("client is already active")]
    AlreadyActive,
    /// The process step is gone, so new ports can no longer be served.
    #[error("process step is not running")]
    ProcessStopped,
    /// The engine rejected a connect or disconnect request.
    #[error("cannot route '{source_port}' -> '{destination_port}': {source}")]
    Routing {
        /// Source port name.
        source_port: String,
        /// Destination port name.
        destination_port: String,
        /// Engine status.
        source: jack::Error,
    },
    /// The simulated engine rejected a connect or disconnect request.
    #[error("cannot route '{source_port}' -> '{destination_port}': {reason}")]
    RoutingRejected {
        /// Source port name.
        source_port: String,
        /// Destination port name.
        destination_port: String,
        /// Why the request was refused.
        reason: &'static str,
    },
    /// The engine does not know a port of this name.
    #[error("unknown port '{0}'")]
    UnknownPort(String),
    /// Creating or configuring a notification pipe failed.
    #[error("notification pipe: {0}")]
    Notify(#[source] nix::errno::Errno),
    /// No group with this id exists in the session.
    #[error("unknown group id: {0}")]
    UnknownGroup(GroupId),
    /// The session already holds the configured number of groups.
    #[error("group limit of {0} reached")]
    GroupLimit(usize),
    /// The session already holds the configured number of MIDI channels.
    #[error("midi channel limit of {0} reached")]
    MidiLimit(usize),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
