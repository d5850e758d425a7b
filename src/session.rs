//! Connection state machine and handshake
//!
//! ```text
//! Disconnected -> Connecting -> WaitingForReady -> Connected
//!       ^              |               |               |
//!       +--------------+---------------+---------------+
//! ```
//!
//! Only the worker thread owns a [`Session`]; other threads observe the
//! published [`SessionState`].

use log::{debug, trace};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::{PresenceError, Result};
use crate::event::ReadyInfo;
use crate::ipc::codec::Frame;
use crate::ipc::protocol::{constants, ErrorPayload, HandshakePayload, Opcode};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    WaitingForReady = 2,
    Connected = 3,
}

impl SessionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::WaitingForReady,
            3 => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }

    fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, WaitingForReady)
                | (WaitingForReady, Connected)
                | (Connecting, Disconnected)
                | (WaitingForReady, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

/// What a frame received during the handshake means
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeFrame {
    /// READY dispatch; the session can go live
    Ready(Option<Value>),
    /// The remote side closed the connection
    Closed { code: Option<i64>, reason: String },
    /// Keep-alive that must be answered with a Pong carrying this payload
    Ping(Vec<u8>),
    /// Anything else; dropped
    Discard,
}

/// Interpret the payload of a Close frame
pub fn close_reason(frame: &Frame) -> (Option<i64>, String) {
    let payload: ErrorPayload = serde_json::from_slice(&frame.payload).unwrap_or_default();
    let reason = payload
        .message
        .unwrap_or_else(|| "connection closed by Discord".to_string());
    (payload.code, reason)
}

/// Classify a frame received while waiting for READY
pub fn classify_handshake_frame(frame: &Frame) -> HandshakeFrame {
    match frame.opcode {
        Opcode::Close => {
            let (code, reason) = close_reason(frame);
            HandshakeFrame::Closed { code, reason }
        }
        Opcode::Ping => HandshakeFrame::Ping(frame.payload.to_vec()),
        Opcode::Frame => match frame.json() {
            Ok(value) if value.get("evt").and_then(Value::as_str) == Some(constants::READY_EVENT) => {
                HandshakeFrame::Ready(value.get("data").cloned())
            }
            Ok(value) => {
                trace!("Frame before READY: {}", value);
                HandshakeFrame::Discard
            }
            Err(_) => HandshakeFrame::Discard,
        },
        Opcode::Handshake | Opcode::Pong => HandshakeFrame::Discard,
    }
}

/// Connection state for one client id
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    client_id: String,
    endpoint: Option<u8>,
    last_error: Option<String>,
    handshake_deadline: Option<Instant>,
}

impl Session {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            state: SessionState::Disconnected,
            client_id: client_id.into(),
            endpoint: None,
            last_error: None,
            handshake_deadline: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Endpoint of the current or most recent connection
    pub fn endpoint(&self) -> Option<u8> {
        self.endpoint
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn transition(&mut self, next: SessionState) -> Result {
        if !self.state.can_become(next) {
            return Err(PresenceError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// `Disconnected -> Connecting`
    pub fn begin_connect(&mut self) -> Result {
        self.transition(SessionState::Connecting)
    }

    /// The handshake frame to send on entering `Connecting`
    pub fn handshake_payload(&self, version: u32) -> HandshakePayload {
        HandshakePayload {
            v: version,
            client_id: self.client_id.clone(),
        }
    }

    /// `Connecting -> WaitingForReady` once the handshake frame is written
    pub fn handshake_sent(&mut self, endpoint: u8, now: Instant, timeout: Duration) -> Result {
        self.transition(SessionState::WaitingForReady)?;
        self.endpoint = Some(endpoint);
        self.handshake_deadline = Some(now + timeout);
        Ok(())
    }

    /// Whether the READY deadline has passed
    pub fn handshake_expired(&self, now: Instant) -> bool {
        self.state == SessionState::WaitingForReady
            && self.handshake_deadline.map_or(false, |deadline| now >= deadline)
    }

    /// `WaitingForReady -> Connected`
    pub fn mark_ready(&mut self, data: Option<&Value>) -> Result<ReadyInfo> {
        self.transition(SessionState::Connected)?;
        self.handshake_deadline = None;
        self.last_error = None;
        Ok(ReadyInfo::from_data(self.endpoint.unwrap_or_default(), data))
    }

    /// Any state -> `Disconnected`, remembering why
    ///
    /// Returns the state the session was in. Disconnecting an already
    /// disconnected session only updates the error.
    pub fn disconnect(&mut self, reason: impl Into<String>) -> SessionState {
        let previous = self.state;
        if previous != SessionState::Disconnected {
            let _ = self.transition(SessionState::Disconnected);
        }
        self.handshake_deadline = None;
        self.last_error = Some(reason.into());
        previous
    }
}
