//! JACK client backing a [`Session`].
use jack::{
    AsyncClient, AudioIn, AudioOut, Client, ClientOptions, Control, MidiIn, NotificationHandler,
    Port, PortSpec, ProcessHandler, ProcessScope,
};
use tracing::{info, warn};

use crate::BridgeError;
use crate::backend::{Backend, BlockScope, CapturePort, MidiSource, PlaybackPort};
use crate::config::SessionConfig;
use crate::process::Processor;
use crate::session::Session;

/// Server notifications are not acted upon.
#[derive(Debug, Default)]
pub struct Notifications;

impl NotificationHandler for Notifications {}

impl BlockScope for ProcessScope {
    fn n_frames(&self) -> usize {
        ProcessScope::n_frames(self) as usize
    }
}

impl CapturePort<ProcessScope> for Port<AudioIn> {
    fn with_samples<R>(&self, scope: &ProcessScope, f: impl FnOnce(&[f32]) -> R) -> R {
        f(self.as_slice(scope))
    }
}

impl PlaybackPort<ProcessScope> for Port<AudioOut> {
    fn with_samples_mut<R>(&mut self, scope: &ProcessScope, f: impl FnOnce(&mut [f32]) -> R) -> R {
        f(self.as_mut_slice(scope))
    }
}

impl MidiSource<ProcessScope> for Port<MidiIn> {
    fn for_each_event(&self, scope: &ProcessScope, mut f: impl FnMut(&[u8])) {
        for raw in self.iter(scope) {
            f(raw.bytes);
        }
    }
}

impl ProcessHandler for Processor<JackBackend> {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        Processor::process(self, ps);
        Control::Continue
    }
}

enum ClientState {
    Inactive(Client),
    Active(AsyncClient<Notifications, Processor<JackBackend>>),
    Closed,
}

/// A JACK client, inactive until the session hands it the process step.
pub struct JackBackend {
    state: ClientState,
}

impl JackBackend {
    /// Open a client named `client_name`. With `start_server` the library may
    /// launch a server when none is running.
    pub fn open(client_name: &str, start_server: bool) -> Result<Self, BridgeError> {
        let options = if start_server {
            ClientOptions::empty()
        } else {
            ClientOptions::NO_START_SERVER
        };
        let (client, status) =
            Client::new(client_name, options).map_err(|source| BridgeError::ClientOpen {
                name: client_name.to_string(),
                source,
            })?;
        info!(
            client = client.name(),
            ?status,
            sample_rate = client.sample_rate() as usize,
            buffer_size = client.buffer_size() as usize,
            "jack client opened"
        );
        Ok(Self {
            state: ClientState::Inactive(client),
        })
    }

    /// Name the server assigned, which may differ from the requested one.
    pub fn client_name(&self) -> Option<&str> {
        self.client().ok().map(Client::name)
    }

    fn unregister<PS: PortSpec>(&self, port: Port<PS>) -> Result<(), BridgeError> {
        let name = port.name().unwrap_or_default();
        self.client()?
            .unregister_port(port)
            .map_err(|source| BridgeError::PortUnregistration { port: name, source })
    }

    fn client(&self) -> Result<&Client, BridgeError> {
        match &self.state {
            ClientState::Inactive(client) => Ok(client),
            ClientState::Active(active) => Ok(active.as_client()),
            ClientState::Closed => Err(BridgeError::ClientClosed),
        }
    }
}

impl Backend for JackBackend {
    type Scope = ProcessScope;
    type AudioIn = Port<AudioIn>;
    type AudioOut = Port<AudioOut>;
    type MidiIn = Port<MidiIn>;

    fn sample_rate(&self) -> usize {
        self.client()
            .map(|client| client.sample_rate() as usize)
            .unwrap_or(0)
    }

    fn buffer_size(&self) -> usize {
        self.client()
            .map(|client| client.buffer_size() as usize)
            .unwrap_or(0)
    }

    fn register_audio_in(&mut self, name: &str) -> Result<Port<AudioIn>, BridgeError> {
        self.client()?
            .register_port(name, AudioIn::default())
            .map_err(|source| BridgeError::PortRegistration {
                port: name.to_string(),
                source,
            })
    }

    fn register_audio_out(&mut self, name: &str) -> Result<Port<AudioOut>, BridgeError> {
        self.client()?
            .register_port(name, AudioOut::default())
            .map_err(|source| BridgeError::PortRegistration {
                port: name.to_string(),
                source,
            })
    }

    fn register_midi_in(&mut self, name: &str) -> Result<Port<MidiIn>, BridgeError> {
        self.client()?
            .register_port(name, MidiIn::default())
            .map_err(|source| BridgeError::PortRegistration {
                port: name.to_string(),
                source,
            })
    }

    fn unregister_audio_in(&mut self, port: Port<AudioIn>) -> Result<(), BridgeError> {
        self.unregister(port)
    }

    fn unregister_audio_out(&mut self, port: Port<AudioOut>) -> Result<(), BridgeError> {
        self.unregister(port)
    }

    fn unregister_midi_in(&mut self, port: Port<MidiIn>) -> Result<(), BridgeError> {
        self.unregister(port)
    }

    fn is_active(&self) -> bool {
        matches!(self.state, ClientState::Active(_))
    }

    fn activate(&mut self, processor: Processor<Self>) -> Result<(), BridgeError> {
        match std::mem::replace(&mut self.state, ClientState::Closed) {
            ClientState::Inactive(client) => {
                // A failed activation consumes the client; the state stays Closed.
                let active = client
                    .activate_async(Notifications, processor)
                    .map_err(BridgeError::Activation)?;
                self.state = ClientState::Active(active);
                Ok(())
            }
            ClientState::Active(active) => {
                self.state = ClientState::Active(active);
                Err(BridgeError::AlreadyActive)
            }
            ClientState::Closed => Err(BridgeError::ClientClosed),
        }
    }

    fn connect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        self.client()?
            .connect_ports_by_name(source, destination)
            .map_err(|err| BridgeError::Routing {
                source_port: source.to_string(),
                destination_port: destination.to_string(),
                source: err,
            })
    }

    fn disconnect(&self, source: &str, destination: &str) -> Result<(), BridgeError> {
        self.client()?
            .disconnect_ports_by_name(source, destination)
            .map_err(|err| BridgeError::Routing {
                source_port: source.to_string(),
                destination_port: destination.to_string(),
                source: err,
            })
    }
}

impl Drop for JackBackend {
    fn drop(&mut self) {
        if let ClientState::Active(active) =
            std::mem::replace(&mut self.state, ClientState::Closed)
        {
            if let Err(err) = active.deactivate() {
                warn!("failed to deactivate jack client: {err}");
            }
        }
    }
}

/// Open a JACK client per `config` and wrap it in a session.
pub fn open_session(config: SessionConfig) -> Result<Session<JackBackend>, BridgeError> {
    config.validate()?;
    let backend = JackBackend::open(&config.client_name, config.start_server)?;
    Session::open(backend, config)
}
