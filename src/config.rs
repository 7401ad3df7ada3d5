//! Session configuration.
use crate::BridgeError;
use crate::ring::SAMPLE_BYTES;

/// Ring capacity given to every audio port unless configured otherwise.
pub const DEFAULT_RING_CAPACITY: usize = 4_096;
/// Default upper bound on groups per session.
pub const DEFAULT_MAX_GROUPS: usize = 64;
/// Default upper bound on MIDI channels per session.
pub const DEFAULT_MAX_MIDI: usize = 16;

/// Parameters fixed for the lifetime of a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client name announced to the audio server.
    pub client_name: String,
    /// Let the JACK client start a server if none is running.
    pub start_server: bool,
    /// Bytes per port ring; must hold whole samples.
    pub ring_capacity: usize,
    /// Groups the process step reserves room for.
    pub max_groups: usize,
    /// MIDI channels the process step reserves room for.
    pub max_midi: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: "jackmux".to_string(),
            start_server: true,
            ring_capacity: DEFAULT_RING_CAPACITY,
            max_groups: DEFAULT_MAX_GROUPS,
            max_midi: DEFAULT_MAX_MIDI,
        }
    }
}

impl SessionConfig {
    /// Default configuration under a different client name.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ..Self::default()
        }
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.client_name.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "client_name must not be empty".to_string(),
            ));
        }
        if self.ring_capacity == 0 || self.ring_capacity % SAMPLE_BYTES != 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "ring_capacity {} is not a positive multiple of {SAMPLE_BYTES}",
                self.ring_capacity
            )));
        }
        if self.max_groups == 0 {
            return Err(BridgeError::InvalidConfig(
                "max_groups must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_capacity, 4_096);
    }

    #[test]
    fn ring_must_hold_whole_samples() {
        let config = SessionConfig {
            ring_capacity: 4_094,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));

        let config = SessionConfig {
            ring_capacity: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_client_name_rejected() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("lua").validate().is_ok());
    }
}
