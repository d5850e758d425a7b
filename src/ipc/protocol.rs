use crate::error::{PresenceError, Result};
use crate::event::SubscriptionKind;
use crate::presence::Presence;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Discord IPC Opcodes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = PresenceError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            _ => Err(PresenceError::MalformedFrame(format!(
                "Invalid opcode value: {}",
                value
            ))),
        }
    }
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        opcode as u32
    }
}

/// Discord IPC Commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Dispatch,
    SetActivity,
    Subscribe,
    Unsubscribe,
    SendActivityJoinInvite,
    CloseActivityRequest,
}

impl Command {
    /// Wire name of the command, as it appears in the `cmd` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Dispatch => "DISPATCH",
            Command::SetActivity => "SET_ACTIVITY",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::SendActivityJoinInvite => "SEND_ACTIVITY_JOIN_INVITE",
            Command::CloseActivityRequest => "CLOSE_ACTIVITY_REQUEST",
        }
    }

    /// Prefix used for nonces of this command
    pub fn nonce_prefix(&self) -> &'static str {
        match self {
            Command::Dispatch => "dispatch",
            Command::SetActivity => "set-activity",
            Command::Subscribe => "subscribe",
            Command::Unsubscribe => "unsubscribe",
            Command::SendActivityJoinInvite => "join-invite",
            Command::CloseActivityRequest => "close-request",
        }
    }
}

/// Discord IPC Message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    pub cmd: Command,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<SubscriptionKind>,
    pub nonce: String,
}

impl IpcMessage {
    /// `SET_ACTIVITY` for the given process; `None` clears the presence
    pub fn set_activity(pid: u32, presence: Option<&Presence>, nonce: String) -> Self {
        Self {
            cmd: Command::SetActivity,
            args: json!({
                "pid": pid,
                "activity": presence,
            }),
            evt: None,
            nonce,
        }
    }

    pub fn subscribe(kind: SubscriptionKind, nonce: String) -> Self {
        Self {
            cmd: Command::Subscribe,
            args: json!({}),
            evt: Some(kind),
            nonce,
        }
    }

    pub fn unsubscribe(kind: SubscriptionKind, nonce: String) -> Self {
        Self {
            cmd: Command::Unsubscribe,
            args: json!({}),
            evt: Some(kind),
            nonce,
        }
    }

    /// Answer an `ACTIVITY_JOIN_REQUEST`
    pub fn join_reply(user_id: &str, accept: bool, nonce: String) -> Self {
        let cmd = if accept {
            Command::SendActivityJoinInvite
        } else {
            Command::CloseActivityRequest
        };
        Self {
            cmd,
            args: json!({ "user_id": user_id }),
            evt: None,
            nonce,
        }
    }
}

/// Handshake payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub v: u32,
    pub client_id: String,
}

/// Response from Discord IPC
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpcResponse {
    pub cmd: Option<String>,
    pub data: Option<Value>,
    pub evt: Option<String>,
    pub nonce: Option<String>,
}

impl IpcResponse {
    /// `data.<key>` as a string, if present
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(Value::as_str)
    }
}

/// Payload of a Close frame, or of an `ERROR` event
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Wire-level constants
pub mod constants {
    /// Discord IPC protocol version sent in the handshake
    pub const IPC_VERSION: u32 = 1;

    /// Endpoints are numbered `discord-ipc-0` to `discord-ipc-9`; Stable, PTB
    /// and Canary each take the lowest free number.
    pub const MAX_IPC_SOCKETS: u8 = 10;

    /// File name of an endpoint, before its number
    pub const IPC_SOCKET_PREFIX: &str = "discord-ipc-";

    /// Default payload ceiling (16 MiB); presence payloads are well under 1 KB
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// `[opcode u32 LE][length u32 LE]`
    pub const IPC_HEADER_SIZE: usize = 8;

    /// `evt` value Discord sends once the handshake is accepted
    pub const READY_EVENT: &str = "READY";

    /// `evt` value carried by error responses and error dispatches
    pub const ERROR_EVENT: &str = "ERROR";
}

/// Protocol parameters shared by the codec and the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcConfig {
    /// Number of endpoint instances to scan when looking for the first available one
    pub max_sockets: u8,

    /// Maximum allowed payload size in bytes, for both directions
    pub max_payload_size: u32,

    /// IPC protocol version to use in handshake
    pub ipc_version: u32,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_sockets: constants::MAX_IPC_SOCKETS,
            max_payload_size: constants::MAX_PAYLOAD_SIZE,
            ipc_version: constants::IPC_VERSION,
        }
    }
}

impl IpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only scan the first three endpoints
    ///
    /// Useful when a single Discord client is known to be running.
    pub fn fast_connect() -> Self {
        Self {
            max_sockets: 3,
            ..Default::default()
        }
    }

    pub fn with_max_sockets(mut self, max_sockets: u8) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.max_sockets == 0 {
            return Err("max_sockets must be greater than 0");
        }
        if self.max_sockets > constants::MAX_IPC_SOCKETS {
            return Err("max_sockets exceeds the number of Discord endpoints (10)");
        }
        if self.max_payload_size < 1024 {
            return Err("max_payload_size too small (minimum 1 KB)");
        }
        if self.max_payload_size > 100 * 1024 * 1024 {
            return Err("max_payload_size too large (maximum 100 MB)");
        }
        Ok(())
    }
}
