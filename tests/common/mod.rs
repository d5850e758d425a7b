//! A scriptable stand-in for the Discord client

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use presence_link::ipc::{decode, encode, Connection, Connector, Opcode, ReadOutcome};
use presence_link::{ClientConfig, Event, PresenceClient, ReconnectPolicy};
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub const CLIENT_ID: &str = "1234567890";

#[derive(Debug)]
struct State {
    available: BTreeSet<u8>,
    auto_ready: bool,
    auto_reply: bool,
    generation: u64,
    open_attempts: usize,
    opened: Vec<u8>,
    handshakes: Vec<Value>,
    commands: Vec<Value>,
    pongs: Vec<Bytes>,
    close_frames: usize,
    injected: VecDeque<Bytes>,
}

/// Fake Discord shared by every connection it hands out
#[derive(Debug, Clone)]
pub struct FakeDiscord {
    state: Arc<Mutex<State>>,
}

impl FakeDiscord {
    /// Listen on the given endpoint indices
    pub fn new(endpoints: &[u8]) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: endpoints.iter().copied().collect(),
                auto_ready: true,
                auto_reply: true,
                generation: 0,
                open_attempts: 0,
                opened: Vec::new(),
                handshakes: Vec::new(),
                commands: Vec::new(),
                pongs: Vec::new(),
                close_frames: 0,
                injected: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn set_available(&self, endpoints: &[u8]) {
        self.lock().available = endpoints.iter().copied().collect();
    }

    /// Whether READY is sent in answer to the handshake
    pub fn set_auto_ready(&self, enabled: bool) {
        self.lock().auto_ready = enabled;
    }

    /// Whether commands are acknowledged
    pub fn set_auto_reply(&self, enabled: bool) {
        self.lock().auto_reply = enabled;
    }

    /// Sever the current connection; the client sees the pipe close
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.injected.clear();
    }

    /// Send a Frame-opcode message to the connected client
    pub fn inject(&self, message: Value) {
        let payload = serde_json::to_vec(&message).unwrap();
        self.inject_frame(Opcode::Frame, &payload);
    }

    pub fn inject_frame(&self, opcode: Opcode, payload: &[u8]) {
        self.lock().injected.push_back(encode(opcode, payload));
    }

    pub fn open_attempts(&self) -> usize {
        self.lock().open_attempts
    }

    pub fn opened(&self) -> Vec<u8> {
        self.lock().opened.clone()
    }

    pub fn handshakes(&self) -> Vec<Value> {
        self.lock().handshakes.clone()
    }

    pub fn commands(&self) -> Vec<Value> {
        self.lock().commands.clone()
    }

    /// Commands received with the given `cmd`
    pub fn commands_named(&self, cmd: &str) -> Vec<Value> {
        self.commands()
            .into_iter()
            .filter(|command| command["cmd"] == cmd)
            .collect()
    }

    pub fn pongs(&self) -> Vec<Bytes> {
        self.lock().pongs.clone()
    }

    pub fn close_frames(&self) -> usize {
        self.lock().close_frames
    }
}

impl Connector for FakeDiscord {
    fn open(&self, index: u8) -> io::Result<Box<dyn Connection>> {
        let mut state = self.lock();
        state.open_attempts += 1;
        if !state.available.contains(&index) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        state.opened.push(index);
        state.injected.clear();
        Ok(Box::new(FakeConnection {
            discord: self.clone(),
            generation: state.generation,
            outbox: BytesMut::new(),
            inbound: BytesMut::new(),
            closed: false,
        }))
    }
}

struct FakeConnection {
    discord: FakeDiscord,
    generation: u64,
    /// Bytes on their way to the client
    outbox: BytesMut,
    /// Bytes written by the client, not yet parsed
    inbound: BytesMut,
    closed: bool,
}

impl FakeConnection {
    fn is_live(&self) -> bool {
        !self.closed && self.discord.lock().generation == self.generation
    }

    fn reply(&mut self, message: Value) {
        let payload = serde_json::to_vec(&message).unwrap();
        self.outbox.extend_from_slice(&encode(Opcode::Frame, &payload));
    }

    fn handle(&mut self, opcode: Opcode, payload: &[u8]) {
        let value: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        match opcode {
            Opcode::Handshake => {
                let auto_ready = {
                    let mut state = self.discord.lock();
                    state.handshakes.push(value);
                    state.auto_ready
                };
                if auto_ready {
                    self.reply(json!({
                        "cmd": "DISPATCH",
                        "evt": "READY",
                        "data": {
                            "v": 1,
                            "config": { "cdn_host": "cdn.discordapp.com" },
                            "user": { "id": "42", "username": "fake" }
                        }
                    }));
                }
            }
            Opcode::Frame => {
                let auto_reply = {
                    let mut state = self.discord.lock();
                    state.commands.push(value.clone());
                    state.auto_reply
                };
                if auto_reply {
                    let cmd = value["cmd"].clone();
                    let nonce = value["nonce"].clone();
                    let data = match cmd.as_str() {
                        Some("SET_ACTIVITY") => value["args"]["activity"].clone(),
                        Some("SUBSCRIBE") | Some("UNSUBSCRIBE") => json!({ "evt": value["evt"] }),
                        _ => Value::Null,
                    };
                    self.reply(json!({ "cmd": cmd, "data": data, "evt": null, "nonce": nonce }));
                }
            }
            Opcode::Pong => self
                .discord
                .lock()
                .pongs
                .push(Bytes::copy_from_slice(payload)),
            Opcode::Close => self.discord.lock().close_frames += 1,
            Opcode::Ping => {
                self.outbox.extend_from_slice(&encode(Opcode::Pong, payload));
            }
        }
    }
}

impl Connection for FakeConnection {
    fn try_read(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        if !self.is_live() {
            return Ok(ReadOutcome::Closed);
        }
        {
            let mut state = self.discord.lock();
            while let Some(frame) = state.injected.pop_front() {
                self.outbox.extend_from_slice(&frame);
            }
        }
        if self.outbox.is_empty() {
            thread::sleep(Duration::from_millis(2));
            return Ok(ReadOutcome::Empty);
        }
        let read = self.outbox.len();
        buf.extend_from_slice(&self.outbox.split());
        Ok(ReadOutcome::Data(read))
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_live() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.inbound.extend_from_slice(bytes);
        while let Ok((frame, consumed)) = decode(&self.inbound, u32::MAX) {
            let _ = self.inbound.split_to(consumed);
            self.handle(frame.opcode, &frame.payload);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Short timeouts so tests run quickly
pub fn test_config() -> ClientConfig {
    ClientConfig::new(CLIENT_ID)
        .with_read_timeout(Duration::from_millis(5))
        .with_handshake_timeout(Duration::from_millis(500))
        .with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(50),
            Duration::from_millis(200),
            2.0,
            None,
        ))
}

pub fn client_for(discord: &FakeDiscord, config: ClientConfig) -> PresenceClient {
    PresenceClient::with_connector(config, discord.connector()).unwrap()
}

/// Poll events until one matches, returning everything seen on the way
pub fn wait_for_event(
    client: &mut PresenceClient,
    timeout: Duration,
    mut matches: impl FnMut(&Event) -> bool,
) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        if let Some(event) = client.wait_event(Duration::from_millis(10)) {
            let done = matches(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
    panic!("no matching event within {:?}; saw {:?}", timeout, seen);
}

/// Wait until `condition` holds
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not met within {:?}", timeout);
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
