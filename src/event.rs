//! Typed events surfaced to the consumer
//!
//! The worker thread is the only producer. Consumers either pull events with
//! [`EventQueue::poll`] or hand an [`EventHandler`] to
//! [`PresenceClient::pump`](crate::PresenceClient::pump) once per tick.
//! Events arrive in the order their frames were received.

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::error::PresenceError;

/// Event kinds a consumer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
    /// Another user accepted an invite; carries the join secret
    #[serde(rename = "ACTIVITY_JOIN")]
    Join,
    /// Another user wants to spectate; carries the spectate secret
    #[serde(rename = "ACTIVITY_SPECTATE")]
    Spectate,
    /// Another user asks to join and awaits an answer
    #[serde(rename = "ACTIVITY_JOIN_REQUEST")]
    JoinRequest,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 3] = [
        SubscriptionKind::Join,
        SubscriptionKind::Spectate,
        SubscriptionKind::JoinRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Join => "ACTIVITY_JOIN",
            SubscriptionKind::Spectate => "ACTIVITY_SPECTATE",
            SubscriptionKind::JoinRequest => "ACTIVITY_JOIN_REQUEST",
        }
    }

    pub fn from_wire(evt: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == evt)
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of confirmed subscriptions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    kinds: BTreeSet<SubscriptionKind>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `kind` was not already present
    pub fn insert(&mut self, kind: SubscriptionKind) -> bool {
        self.kinds.insert(kind)
    }

    /// Returns `true` if `kind` was present
    pub fn remove(&mut self, kind: SubscriptionKind) -> bool {
        self.kinds.remove(&kind)
    }

    pub fn contains(&self, kind: SubscriptionKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SubscriptionKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Apply a confirmed subscription change carried by `event`
    ///
    /// Returns `true` if the set changed.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Subscribed(kind) => self.insert(*kind),
            Event::Unsubscribed(kind) => self.remove(*kind),
            _ => false,
        }
    }
}

/// A Discord user, as sent in READY and join requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// The `config` block of a READY dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub cdn_host: Option<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

/// Payload of [`Event::Ready`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyInfo {
    /// Endpoint the session is bound to
    pub endpoint: u8,
    pub version: Option<u32>,
    pub user: Option<User>,
    pub config: Option<ServerConfig>,
}

impl ReadyInfo {
    /// Parse the `data` object of a READY dispatch
    pub fn from_data(endpoint: u8, data: Option<&Value>) -> Self {
        let field = |key: &str| data.and_then(|data| data.get(key)).cloned();
        Self {
            endpoint,
            version: data
                .and_then(|data| data.get("v"))
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            user: field("user").and_then(|user| serde_json::from_value(user).ok()),
            config: field("config").and_then(|config| serde_json::from_value(config).ok()),
        }
    }
}

/// An application-level error reported by Discord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    /// Nonce of the command that failed, when the error answers one
    pub nonce: Option<String>,
}

impl From<RemoteError> for PresenceError {
    fn from(error: RemoteError) -> Self {
        PresenceError::remote(error.code, error.message)
    }
}

/// Events delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The handshake completed; always the first event on a connection
    Ready(ReadyInfo),
    /// Discord reported an error; the session stays up
    Error(RemoteError),
    /// Discord accepted a `SET_ACTIVITY`
    PresenceUpdated {
        nonce: String,
        /// The presence as Discord echoed it; `None` after a clear
        presence: Option<Value>,
    },
    Subscribed(SubscriptionKind),
    Unsubscribed(SubscriptionKind),
    /// A user accepted an invite and the game should join with this secret
    Join { secret: String },
    /// A user wants to spectate with this secret
    Spectate { secret: String },
    /// A user asked to join; answer with
    /// [`PresenceClient::respond`](crate::PresenceClient::respond)
    JoinRequest(User),
    /// Discord processed an answer to a join request
    JoinRequestAnswered {
        user_id: Option<String>,
        accepted: bool,
    },
    /// An established connection went away
    Disconnected { code: Option<i64>, reason: String },
    /// A queued command could not be encoded and was never sent
    CommandDropped { nonce: String, reason: String },
    /// A frame the dispatcher does not recognize
    Unhandled {
        cmd: Option<String>,
        evt: Option<String>,
        data: Option<Value>,
    },
}

impl Event {
    /// Invoke the matching [`EventHandler`] callback
    pub fn dispatch_to<H: EventHandler + ?Sized>(&self, handler: &mut H) {
        match self {
            Event::Ready(info) => handler.on_ready(info),
            Event::Error(error) => handler.on_error(error),
            Event::PresenceUpdated { nonce, presence } => {
                handler.on_presence_update(nonce, presence.as_ref())
            }
            Event::Subscribed(kind) => handler.on_subscribe(*kind),
            Event::Unsubscribed(kind) => handler.on_unsubscribe(*kind),
            Event::Join { secret } => handler.on_join(secret),
            Event::Spectate { secret } => handler.on_spectate(secret),
            Event::JoinRequest(user) => handler.on_join_request(user),
            Event::JoinRequestAnswered { user_id, accepted } => {
                handler.on_join_request_answered(user_id.as_deref(), *accepted)
            }
            Event::Disconnected { code, reason } => handler.on_disconnected(*code, reason),
            Event::CommandDropped { nonce, reason } => handler.on_command_dropped(nonce, reason),
            Event::Unhandled { cmd, evt, data } => {
                handler.on_unhandled(cmd.as_deref(), evt.as_deref(), data.as_ref())
            }
        }
    }
}

/// Callback-style consumer of [`Event`]s
///
/// Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait EventHandler {
    fn on_ready(&mut self, info: &ReadyInfo) {}
    fn on_error(&mut self, error: &RemoteError) {}
    fn on_presence_update(&mut self, nonce: &str, presence: Option<&Value>) {}
    fn on_subscribe(&mut self, kind: SubscriptionKind) {}
    fn on_unsubscribe(&mut self, kind: SubscriptionKind) {}
    fn on_join(&mut self, secret: &str) {}
    fn on_spectate(&mut self, secret: &str) {}
    fn on_join_request(&mut self, user: &User) {}
    fn on_join_request_answered(&mut self, user_id: Option<&str>, accepted: bool) {}
    fn on_disconnected(&mut self, code: Option<i64>, reason: &str) {}
    fn on_command_dropped(&mut self, nonce: &str, reason: &str) {}
    fn on_unhandled(&mut self, cmd: Option<&str>, evt: Option<&str>, data: Option<&Value>) {}
}

/// Consumer end of the event channel
#[derive(Debug, Clone)]
pub struct EventQueue {
    receiver: Receiver<Event>,
}

impl EventQueue {
    pub(crate) fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Next event, without blocking
    pub fn poll(&self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Next event, waiting at most `timeout`
    pub fn wait(&self, timeout: Duration) -> Option<Event> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Every event currently queued
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
