//! Client configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PresenceError, Result};
use crate::ipc::{EndpointHint, IpcConfig};
use crate::retry::ReconnectPolicy;

/// Environment variable holding the application's client id
pub const ENV_CLIENT_ID: &str = "DISCORD_CLIENT_ID";
/// Environment variable selecting an endpoint (`auto` or `0`-`9`)
pub const ENV_ENDPOINT: &str = "DISCORD_IPC_ENDPOINT";
/// Environment variable overriding the Unix socket directory
pub const ENV_SOCKET_DIR: &str = "DISCORD_IPC_DIR";

/// Everything a [`PresenceClient`](crate::PresenceClient) needs to run
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// The Discord application id
    pub client_id: String,

    /// Which endpoint to connect to
    pub endpoint: EndpointHint,

    /// Protocol parameters
    pub ipc: IpcConfig,

    /// How long to wait for READY after sending the handshake
    pub handshake_timeout: Duration,

    /// Upper bound on a single blocking read, and on how long shutdown takes to notice
    pub read_timeout: Duration,

    /// Pending commands without a reply after this long are dropped
    pub pending_timeout: Duration,

    /// Backoff between connection attempts
    pub reconnect: ReconnectPolicy,

    /// Directories searched for Unix sockets instead of the platform defaults
    pub socket_dirs: Option<Vec<PathBuf>>,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            endpoint: EndpointHint::FirstAvailable,
            ipc: IpcConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(50),
            pending_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            socket_dirs: None,
        }
    }

    /// Build a configuration from `DISCORD_CLIENT_ID`, `DISCORD_IPC_ENDPOINT`
    /// and `DISCORD_IPC_DIR`
    pub fn from_env() -> Result<Self> {
        let client_id = env::var(ENV_CLIENT_ID)
            .map_err(|_| PresenceError::InvalidConfig("DISCORD_CLIENT_ID is not set"))?;
        let mut config = Self::new(client_id);

        if let Ok(endpoint) = env::var(ENV_ENDPOINT) {
            config.endpoint = endpoint.parse()?;
        }
        if let Some(dir) = env::var_os(ENV_SOCKET_DIR).filter(|dir| !dir.is_empty()) {
            config.socket_dirs = Some(vec![PathBuf::from(dir)]);
        }

        config.validate()?;
        Ok(config)
    }

    /// Scan fewer endpoints and give up on a silent Discord sooner
    pub fn fast_connect(client_id: impl Into<String>) -> Self {
        Self {
            ipc: IpcConfig::fast_connect(),
            handshake_timeout: Duration::from_secs(2),
            ..Self::new(client_id)
        }
    }

    /// Keep retrying with long gaps; suited to background tools
    pub fn persistent(client_id: impl Into<String>) -> Self {
        Self {
            reconnect: ReconnectPolicy::new(
                Duration::from_secs(2),
                Duration::from_secs(120),
                2.0,
                None,
            ),
            ..Self::new(client_id)
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointHint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_ipc(mut self, ipc: IpcConfig) -> Self {
        self.ipc = ipc;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_socket_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.socket_dirs = Some(dirs);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result {
        if self.client_id.trim().is_empty() {
            return Err(PresenceError::InvalidConfig("client_id must not be empty"));
        }
        if !self.client_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(PresenceError::InvalidConfig(
                "client_id must be a numeric application id",
            ));
        }
        if let EndpointHint::Index(index) = self.endpoint {
            if index >= self.ipc.max_sockets {
                return Err(PresenceError::InvalidConfig(
                    "endpoint index is outside the scanned endpoint range",
                ));
            }
        }
        if self.handshake_timeout.is_zero() {
            return Err(PresenceError::InvalidConfig(
                "handshake_timeout must be greater than 0",
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(PresenceError::InvalidConfig(
                "read_timeout must be greater than 0",
            ));
        }
        if self.read_timeout > Duration::from_secs(1) {
            return Err(PresenceError::InvalidConfig(
                "read_timeout above 1 second makes shutdown sluggish",
            ));
        }
        if self.pending_timeout.is_zero() {
            return Err(PresenceError::InvalidConfig(
                "pending_timeout must be greater than 0",
            ));
        }
        if let Some(dirs) = &self.socket_dirs {
            if dirs.is_empty() {
                return Err(PresenceError::InvalidConfig(
                    "socket_dirs must name at least one directory",
                ));
            }
        }
        self.ipc.validate().map_err(PresenceError::InvalidConfig)?;
        self.reconnect
            .validate()
            .map_err(PresenceError::InvalidConfig)?;
        Ok(())
    }
}
