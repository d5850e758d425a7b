//! The thread that owns the transport
//!
//! The worker connects, performs the handshake, flushes queued commands, and
//! turns inbound frames into events. It is the only code that writes to the
//! connection. Every failure ends in `Disconnected` and a scheduled retry.

use crossbeam_channel::Sender;
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crate::config::ClientConfig;
use crate::dispatch::{CommandQueue, Dispatcher};
use crate::error::PresenceError;
use crate::event::Event;
use crate::ipc::codec::{self, Frame, FrameReader};
use crate::ipc::protocol::Opcode;
use crate::ipc::transport::{self, BoundConnection, Connector, ReadOutcome};
use crate::retry::{Decision, Supervisor};
use crate::session::{classify_handshake_frame, close_reason, HandshakeFrame, Session, SessionState};

/// State shared between the consumer and the worker
#[derive(Debug, Default)]
pub(crate) struct Shared {
    queue: Mutex<CommandQueue>,
    state: AtomicU8,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn queue(&self) -> MutexGuard<'_, CommandQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn publish(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn clear_shutdown(&self) {
        self.shutdown.store(false, Ordering::Release);
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Why the current connection is being torn down
#[derive(Debug)]
enum Teardown {
    Error(PresenceError),
    /// Discord sent a Close frame
    Closed { code: Option<i64>, reason: String },
}

impl From<PresenceError> for Teardown {
    fn from(err: PresenceError) -> Self {
        Teardown::Error(err)
    }
}

type Step = std::result::Result<(), Teardown>;

pub(crate) struct Worker {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    events: Sender<Event>,
    session: Session,
    dispatcher: Dispatcher,
    supervisor: Supervisor,
    link: Option<BoundConnection>,
    reader: FrameReader,
    gave_up: bool,
}

impl Worker {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        events: Sender<Event>,
    ) -> Self {
        Self {
            session: Session::new(config.client_id.clone()),
            dispatcher: Dispatcher::new(),
            supervisor: Supervisor::new(config.reconnect.clone()),
            reader: FrameReader::new(config.ipc.max_payload_size),
            link: None,
            gave_up: false,
            config,
            connector,
            shared,
            events,
        }
    }

    /// Run until shutdown is requested
    pub(crate) fn run(mut self) {
        debug!("Worker started for client {}", self.session.client_id());
        while !self.shared.shutdown_requested() {
            let outcome = match self.session.state() {
                SessionState::WaitingForReady => self.await_ready(),
                SessionState::Connected => self.service(),
                SessionState::Disconnected | SessionState::Connecting => {
                    self.idle_or_connect();
                    Ok(())
                }
            };
            if let Err(teardown) = outcome {
                self.teardown(teardown);
            }
        }
        self.shutdown();
        debug!("Worker stopped");
    }

    fn emit(&self, event: Event) {
        trace!("Event: {:?}", event);
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    fn publish(&self) {
        self.shared.publish(self.session.state());
    }

    fn idle_or_connect(&mut self) {
        match self.supervisor.decide(Instant::now()) {
            Decision::Attempt => {
                if let Err(err) = self.open() {
                    self.teardown(Teardown::Error(err));
                }
            }
            Decision::Wait(delay) => thread::sleep(delay.min(self.config.read_timeout)),
            Decision::GiveUp => {
                if !self.gave_up {
                    self.gave_up = true;
                    let reason = format!(
                        "giving up after {} failed connection attempt(s)",
                        self.supervisor.failures()
                    );
                    warn!("{}", reason);
                    self.emit(Event::Disconnected { code: None, reason });
                }
                thread::sleep(self.config.read_timeout);
            }
        }
    }

    /// Connect and send the handshake
    fn open(&mut self) -> crate::Result {
        self.session.begin_connect()?;
        self.publish();

        let bound = transport::connect(
            self.connector.as_ref(),
            self.config.endpoint,
            self.config.ipc.max_sockets,
        )?;
        let endpoint = bound.endpoint;
        self.reader.clear();
        self.link = Some(bound);

        let handshake = self.session.handshake_payload(self.config.ipc.ipc_version);
        let frame = codec::encode_json(
            Opcode::Handshake,
            &handshake,
            self.config.ipc.max_payload_size,
        )?;
        self.write(&frame)?;

        self.session
            .handshake_sent(endpoint, Instant::now(), self.config.handshake_timeout)?;
        self.publish();
        debug!("Handshake sent on {}", transport::endpoint_name(endpoint));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> crate::Result {
        let link = self.link.as_mut().ok_or(PresenceError::SocketClosed)?;
        link.connection
            .write_all(bytes)
            .map_err(PresenceError::WriteError)
    }

    fn send(&mut self, opcode: Opcode, payload: &[u8]) -> crate::Result {
        self.write(&codec::encode(opcode, payload))
    }

    /// One bounded read, split into whole frames
    fn read_frames(&mut self) -> crate::Result<Vec<Frame>> {
        let link = self.link.as_mut().ok_or(PresenceError::SocketClosed)?;
        match link.connection.try_read(self.reader.buffer_mut())? {
            ReadOutcome::Closed => return Err(PresenceError::SocketClosed),
            ReadOutcome::Empty => return Ok(Vec::new()),
            ReadOutcome::Data(read) => trace!("Read {} byte(s)", read),
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.reader.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn await_ready(&mut self) -> Step {
        if self.session.handshake_expired(Instant::now()) {
            return Err(PresenceError::HandshakeTimeout(self.config.handshake_timeout).into());
        }
        for frame in self.read_frames()? {
            self.handle_frame(frame)?;
        }
        Ok(())
    }

    fn service(&mut self) -> Step {
        self.flush()?;
        for frame in self.read_frames()? {
            self.handle_frame(frame)?;
        }
        self.dispatcher
            .expire(Instant::now(), self.config.pending_timeout);
        Ok(())
    }

    /// Write every queued command; unsent ones go back to the queue on failure
    fn flush(&mut self) -> Step {
        let queued = self.shared.queue().drain();
        if queued.is_empty() {
            return Ok(());
        }

        let pid = std::process::id();
        let mut remaining = queued.into_iter();
        while let Some(command) = remaining.next() {
            let message = command.command.to_message(pid, command.nonce.clone());
            let bytes = match codec::encode_json(
                Opcode::Frame,
                &message,
                self.config.ipc.max_payload_size,
            ) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("Dropping {}: {}", message.cmd.as_str(), err);
                    self.emit(Event::CommandDropped {
                        nonce: command.nonce,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if let Err(err) = self.write(&bytes) {
                let mut unsent = vec![command];
                unsent.extend(remaining);
                self.shared.queue().restore(unsent);
                return Err(err.into());
            }
            debug!("Sent {} ({})", message.cmd.as_str(), command.nonce);
            self.dispatcher.on_sent(command, Instant::now());
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> Step {
        match self.session.state() {
            SessionState::WaitingForReady => match classify_handshake_frame(&frame) {
                HandshakeFrame::Ready(data) => {
                    let info = self.session.mark_ready(data.as_ref())?;
                    self.publish();
                    self.supervisor.record_success();
                    self.gave_up = false;
                    info!(
                        "Connected to Discord on {}",
                        transport::endpoint_name(info.endpoint)
                    );
                    self.emit(Event::Ready(info));
                    self.shared.queue().resync(self.dispatcher.subscriptions());
                    Ok(())
                }
                HandshakeFrame::Closed { code, reason } => Err(Teardown::Closed { code, reason }),
                HandshakeFrame::Ping(payload) => Ok(self.send(Opcode::Pong, &payload)?),
                HandshakeFrame::Discard => Ok(()),
            },
            SessionState::Connected => match frame.opcode {
                Opcode::Frame => {
                    let value = frame.json()?;
                    trace!("Received: {}", value);
                    let endpoint = self.session.endpoint().unwrap_or_default();
                    let event = self.dispatcher.dispatch_value(value, endpoint);
                    if let Event::Error(error) = &event {
                        warn!("Discord error {}: {}", error.code, error.message);
                    }
                    self.emit(event);
                    Ok(())
                }
                Opcode::Ping => Ok(self.send(Opcode::Pong, &frame.payload)?),
                Opcode::Close => {
                    let (code, reason) = close_reason(&frame);
                    Err(Teardown::Closed { code, reason })
                }
                Opcode::Pong | Opcode::Handshake => Ok(()),
            },
            SessionState::Disconnected | SessionState::Connecting => Ok(()),
        }
    }

    /// Drop the connection and schedule the next attempt
    fn teardown(&mut self, teardown: Teardown) {
        let (code, reason) = match teardown {
            Teardown::Error(err) => (None, err.to_string()),
            Teardown::Closed { code, reason } => (code, reason),
        };

        if let Some(mut link) = self.link.take() {
            link.connection.close();
        }
        self.reader.clear();
        self.dispatcher.teardown();
        let previous = self.session.disconnect(reason.clone());
        self.publish();

        let retry_in = self.supervisor.record_failure(Instant::now());
        if previous == SessionState::Connected {
            warn!("Connection to Discord lost: {}", reason);
            self.emit(Event::Disconnected { code, reason });
        } else {
            debug!("Connection attempt failed: {}", reason);
        }
        if let Some(delay) = retry_in {
            debug!("Next connection attempt in {:?}", delay);
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut link) = self.link.take() {
            if self.session.state() == SessionState::Connected {
                let frame = codec::encode(Opcode::Close, b"{}");
                if let Err(err) = link.connection.write_all(&frame) {
                    trace!("Close frame not delivered: {}", err);
                }
            }
            link.connection.close();
        }
        self.dispatcher.teardown();
        self.session.disconnect("client stopped");
        self.publish();
    }
}
