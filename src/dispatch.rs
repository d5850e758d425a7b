//! Outbound command queue and inbound frame dispatcher

use log::{debug, warn};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::event::{Event, ReadyInfo, RemoteError, SubscriptionKind, SubscriptionSet, User};
use crate::ipc::protocol::{constants, Command, ErrorPayload, IpcMessage, IpcResponse};
use crate::nonce::nonce_for;
use crate::presence::Presence;

/// A command waiting to be written to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// `SET_ACTIVITY`; `None` clears the presence
    SetPresence(Option<Presence>),
    Subscribe(SubscriptionKind),
    Unsubscribe(SubscriptionKind),
    /// Answer a join request
    JoinReply { user_id: String, accept: bool },
}

impl OutboundCommand {
    pub fn command(&self) -> Command {
        match self {
            OutboundCommand::SetPresence(_) => Command::SetActivity,
            OutboundCommand::Subscribe(_) => Command::Subscribe,
            OutboundCommand::Unsubscribe(_) => Command::Unsubscribe,
            OutboundCommand::JoinReply { accept: true, .. } => Command::SendActivityJoinInvite,
            OutboundCommand::JoinReply { accept: false, .. } => Command::CloseActivityRequest,
        }
    }

    /// The wire message for this command
    pub fn to_message(&self, pid: u32, nonce: String) -> IpcMessage {
        match self {
            OutboundCommand::SetPresence(presence) => {
                IpcMessage::set_activity(pid, presence.as_ref(), nonce)
            }
            OutboundCommand::Subscribe(kind) => IpcMessage::subscribe(*kind, nonce),
            OutboundCommand::Unsubscribe(kind) => IpcMessage::unsubscribe(*kind, nonce),
            OutboundCommand::JoinReply { user_id, accept } => {
                IpcMessage::join_reply(user_id, *accept, nonce)
            }
        }
    }
}

/// Identifies an enqueued command; its nonce is echoed in the matching events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    nonce: String,
}

impl CommandHandle {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

/// A queued command with the nonce it will be sent under
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    pub nonce: String,
    pub command: OutboundCommand,
}

#[derive(Debug)]
enum Slot {
    /// Position of the coalesced presence update in FIFO order
    Presence,
    Command(QueuedCommand),
}

/// FIFO of outbound commands with last-write-wins presence
///
/// Presence updates share one slot: setting presence several times before
/// the worker drains the queue sends only the newest value, in the position
/// of the first unsent update.
#[derive(Debug, Default)]
pub struct CommandQueue {
    slots: VecDeque<Slot>,
    pending_presence: Option<QueuedCommand>,
    last_presence: Option<Presence>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for transmission
    pub fn enqueue(&mut self, command: OutboundCommand) -> CommandHandle {
        if let OutboundCommand::SetPresence(presence) = command {
            return self.set_presence(presence);
        }
        let nonce = nonce_for(command.command());
        self.slots.push_back(Slot::Command(QueuedCommand {
            nonce: nonce.clone(),
            command,
        }));
        CommandHandle { nonce }
    }

    /// Replace the presence to send; `None` clears it
    pub fn set_presence(&mut self, presence: Option<Presence>) -> CommandHandle {
        let nonce = nonce_for(Command::SetActivity);
        self.last_presence = presence.clone();
        if self.pending_presence.is_none() {
            self.slots.push_back(Slot::Presence);
        }
        self.pending_presence = Some(QueuedCommand {
            nonce: nonce.clone(),
            command: OutboundCommand::SetPresence(presence),
        });
        CommandHandle { nonce }
    }

    /// The most recent presence the consumer asked for
    pub fn last_presence(&self) -> Option<&Presence> {
        self.last_presence.as_ref()
    }

    /// Take everything queued, in FIFO order
    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        let mut drained = Vec::with_capacity(self.slots.len());
        while let Some(slot) = self.slots.pop_front() {
            match slot {
                Slot::Presence => {
                    if let Some(presence) = self.pending_presence.take() {
                        drained.push(presence);
                    }
                }
                Slot::Command(command) => drained.push(command),
            }
        }
        drained
    }

    /// Put commands that could not be written back at the front, in order
    ///
    /// A presence update is only restored if no newer one was queued meanwhile.
    pub fn restore(&mut self, unsent: Vec<QueuedCommand>) {
        for queued in unsent.into_iter().rev() {
            match queued.command {
                OutboundCommand::SetPresence(_) => {
                    if self.pending_presence.is_none() {
                        self.pending_presence = Some(queued);
                        self.slots.push_front(Slot::Presence);
                    }
                }
                _ => self.slots.push_front(Slot::Command(queued)),
            }
        }
    }

    /// Queue the state that must survive a reconnect
    ///
    /// Re-sends the last known presence unless an update is already queued,
    /// then re-subscribes to every confirmed subscription the consumer has
    /// not already queued a subscribe or unsubscribe for.
    pub fn resync(&mut self, subscriptions: &SubscriptionSet) {
        if self.pending_presence.is_none() {
            if let Some(presence) = self.last_presence.clone() {
                self.set_presence(Some(presence));
            }
        }
        for kind in subscriptions.iter() {
            if !self.has_queued_change(kind) {
                self.enqueue(OutboundCommand::Subscribe(kind));
            }
        }
    }

    /// Whether a `SUBSCRIBE` or `UNSUBSCRIBE` for `kind` is waiting to be sent
    fn has_queued_change(&self, kind: SubscriptionKind) -> bool {
        self.slots.iter().any(|slot| match slot {
            Slot::Command(QueuedCommand {
                command: OutboundCommand::Subscribe(queued) | OutboundCommand::Unsubscribe(queued),
                ..
            }) => *queued == kind,
            _ => false,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A command written to the transport and awaiting its reply
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub nonce: String,
    pub command: OutboundCommand,
    pub sent_at: Instant,
}

/// Matches replies to pending commands and turns frames into [`Event`]s
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<String, PendingCommand>,
    subscriptions: SubscriptionSet,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command that was just written
    pub fn on_sent(&mut self, queued: QueuedCommand, now: Instant) {
        self.pending.insert(
            queued.nonce.clone(),
            PendingCommand {
                nonce: queued.nonce,
                command: queued.command,
                sent_at: now,
            },
        );
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, nonce: &str) -> bool {
        self.pending.contains_key(nonce)
    }

    /// Subscriptions Discord has confirmed on this or a previous connection
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Drop pending commands; called when the session goes down
    pub fn teardown(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            debug!("Dropping {} pending command(s) on teardown", dropped);
        }
        self.pending.clear();
        dropped
    }

    /// Drop pending commands older than `max_age` and return how many were dropped
    pub fn expire(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|nonce, pending| {
            let keep = now.saturating_duration_since(pending.sent_at) <= max_age;
            if !keep {
                warn!(
                    "No reply to {} ({}) after {:?}",
                    pending.command.command().as_str(),
                    nonce,
                    max_age
                );
            }
            keep
        });
        before - self.pending.len()
    }

    /// Turn an inbound message into an event
    ///
    /// `endpoint` is only used for READY dispatches.
    pub fn dispatch(&mut self, response: IpcResponse, endpoint: u8) -> Event {
        let pending = response
            .nonce
            .as_deref()
            .and_then(|nonce| self.pending.remove(nonce));

        match response.evt.as_deref() {
            Some(constants::READY_EVENT) => {
                return Event::Ready(ReadyInfo::from_data(endpoint, response.data.as_ref()))
            }
            Some(constants::ERROR_EVENT) => {
                let payload: ErrorPayload = response
                    .data
                    .clone()
                    .and_then(|data| serde_json::from_value(data).ok())
                    .unwrap_or_default();
                return Event::Error(RemoteError {
                    code: payload.code.unwrap_or_default(),
                    message: payload
                        .message
                        .unwrap_or_else(|| "unknown Discord error".to_string()),
                    nonce: response.nonce,
                });
            }
            Some("ACTIVITY_JOIN") if response.data_str("secret").is_some() => {
                return Event::Join {
                    secret: response.data_str("secret").unwrap_or_default().to_string(),
                }
            }
            Some("ACTIVITY_SPECTATE") if response.data_str("secret").is_some() => {
                return Event::Spectate {
                    secret: response.data_str("secret").unwrap_or_default().to_string(),
                }
            }
            Some("ACTIVITY_JOIN_REQUEST") => {
                let user = response
                    .data
                    .as_ref()
                    .and_then(|data| data.get("user"))
                    .cloned()
                    .and_then(|user| serde_json::from_value::<User>(user).ok());
                if let Some(user) = user {
                    return Event::JoinRequest(user);
                }
            }
            _ => {}
        }

        if response.evt.is_none() {
            match response.cmd.as_deref() {
                Some("SET_ACTIVITY") => {
                    return Event::PresenceUpdated {
                        nonce: response.nonce.unwrap_or_default(),
                        presence: response.data.filter(|data| !data.is_null()),
                    }
                }
                Some(cmd @ ("SUBSCRIBE" | "UNSUBSCRIBE")) => {
                    let kind = response
                        .data_str("evt")
                        .and_then(SubscriptionKind::from_wire)
                        .or_else(|| match pending.as_ref().map(|p| &p.command) {
                            Some(OutboundCommand::Subscribe(kind))
                            | Some(OutboundCommand::Unsubscribe(kind)) => Some(*kind),
                            _ => None,
                        });
                    if let Some(kind) = kind {
                        return if cmd == "SUBSCRIBE" {
                            self.subscriptions.insert(kind);
                            Event::Subscribed(kind)
                        } else {
                            self.subscriptions.remove(kind);
                            Event::Unsubscribed(kind)
                        };
                    }
                }
                Some(cmd @ ("SEND_ACTIVITY_JOIN_INVITE" | "CLOSE_ACTIVITY_REQUEST")) => {
                    let user_id = match pending.map(|p| p.command) {
                        Some(OutboundCommand::JoinReply { user_id, .. }) => Some(user_id),
                        _ => None,
                    };
                    return Event::JoinRequestAnswered {
                        user_id,
                        accepted: cmd == "SEND_ACTIVITY_JOIN_INVITE",
                    };
                }
                _ => {}
            }
        }

        Event::Unhandled {
            cmd: response.cmd,
            evt: response.evt,
            data: response.data,
        }
    }

    /// Parse a Frame-opcode payload and dispatch it
    pub fn dispatch_value(&mut self, value: Value, endpoint: u8) -> Event {
        match serde_json::from_value::<IpcResponse>(value.clone()) {
            Ok(response) => self.dispatch(response, endpoint),
            Err(_) => Event::Unhandled {
                cmd: None,
                evt: None,
                data: Some(value),
            },
        }
    }
}
