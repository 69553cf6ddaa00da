use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::utils::{RelayError, Result};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub service: ServiceSettings,
    pub store: StoreSettings,
    pub fleet: FleetSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

/// Defines the host and port the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Service identity. `name` and `version` build the store key prefixes and
/// `topic` is the shared fleet topic every node subscribes to.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceSettings {
    pub name: String,
    pub version: String,
    pub topic: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Sled,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub sled_path: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FleetBackend {
    Redis,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FleetSettings {
    pub backend: FleetBackend,
    pub redis_url: String,
}

/// Per-connection limits and timers.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionSettings {
    pub outbound_capacity: usize,
    pub write_wait_secs: u64,
    pub pong_wait_secs: u64,
    pub max_message_bytes: usize,
    pub auth_grace_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Settings {
    /// Returns `(chat_prefix, app_prefix)`, two disjoint keyspaces in one store.
    pub fn key_prefixes(&self) -> (String, String) {
        let chat = format!("{}:{}:", self.service.name, self.service.version);
        let app = format!("{chat}app:");
        (chat, app)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl SessionSettings {
    /// Rejects values the session loops cannot run with: a zero-sized
    /// outbound buffer, zero timers or a zero frame limit.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("outbound_capacity", self.outbound_capacity as u64),
            ("write_wait_secs", self.write_wait_secs),
            ("pong_wait_secs", self.pong_wait_secs),
            ("max_message_bytes", self.max_message_bytes as u64),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((field, _)) => Err(RelayError::Config(ConfigError::Message(format!(
                "session.{field} must be greater than zero"
            )))),
            None => Ok(()),
        }
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Pings go out at 9/10 of the pong deadline so a healthy peer always
    /// answers in time.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn auth_grace(&self) -> Duration {
        Duration::from_secs(self.auth_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "relaychat".to_string(),
            version: "latest".to_string(),
            topic: "relaychat.messages".to_string(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            sled_path: "relaychat_db".to_string(),
        }
    }
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            backend: FleetBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            write_wait_secs: 10,
            pong_wait_secs: 50,
            max_message_bytes: 8 * 1024,
            auth_grace_secs: 30,
            sweep_interval_secs: 120,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
