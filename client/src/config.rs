//! Configuration for the NT4 client
//!
//! Every field has a default, so a JSON document only needs the keys it overrides.
//! Durations are written in milliseconds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port the robot-side NT4 server listens on
pub const DEFAULT_PORT: u16 = 5810;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Robot or simulator address
    pub host: String,
    pub port: u16,
    /// Identifies this client to the server, appended to the connection path
    pub client_name: String,
    /// Full WebSocket URL, replaces the one built from `host`, `port` and `client_name`
    pub url: Option<String>,
    pub reconnect: ReconnectConfig,
    /// Topic whose updates prove that robot code is running
    pub heartbeat_topic: String,
    /// How long the heartbeat topic may stay silent before the robot counts as disconnected
    #[serde(with = "millis")]
    pub robot_timeout: Duration,
    /// Upper bound on waiting for the time synchronization reply after connecting
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    #[serde(with = "millis")]
    pub timesync_interval: Duration,
    /// Resolution of the liveness and handshake timers
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    pub write_policy: WritePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_name: "nt4-client".to_string(),
            url: None,
            reconnect: ReconnectConfig::default(),
            heartbeat_topic: "/Robot/Heartbeat".to_string(),
            robot_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(1),
            timesync_interval: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
            write_policy: WritePolicy::Optimistic,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> ClientConfig {
        ClientConfig {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Parses a JSON configuration document
    pub fn from_json(json: &str) -> Result<ClientConfig> {
        let doc: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        // serde also builds structs out of sequences, which would turn `[]` into the defaults
        if !doc.is_object() {
            return Err(Error::Config("configuration must be a JSON object".to_string()));
        }
        let config: ClientConfig =
            serde_json::from_value(doc).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_none() && self.host.is_empty() {
            return Err(Error::Config("either host or url must be set".to_string()));
        }
        if !self.heartbeat_topic.starts_with('/') {
            return Err(Error::Config(format!(
                "heartbeat topic '{}' must be an absolute path",
                self.heartbeat_topic
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::Config("tick_interval must be positive".to_string()));
        }
        self.reconnect.validate()
    }

    /// The URL the connection loop dials
    pub fn server_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("ws://{}:{}/nt/{}", self.host, self.port, self.client_name),
        }
    }
}

/// Whether a write shows up locally before the server has seen it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Apply written values to the local store as soon as they are sent.
    /// NT4 servers do not echo a value back to the client that published it.
    Optimistic,
    /// Only values received from the server update the local store
    Confirmed,
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random, 0 disables jitter
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl ReconnectConfig {
    fn validate(&self) -> Result<()> {
        if self.multiplier < 1.0 {
            return Err(Error::Config("reconnect multiplier must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(Error::Config("reconnect jitter must be within [0, 1)".to_string()));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::Config(
                "reconnect max_delay is shorter than initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
