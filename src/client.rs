use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::dispatch::{CommandHandle, OutboundCommand};
use crate::error::{PresenceError, Result};
use crate::event::{Event, EventHandler, EventQueue, SubscriptionKind, SubscriptionSet};
use crate::ipc::transport::{default_connector, Connector, DiscoveredEndpoint};
use crate::presence::Presence;
use crate::session::SessionState;
use crate::worker::{Shared, Worker};

/// Name of the thread that owns the connection
pub const WORKER_THREAD_NAME: &str = "presence-ipc";

/// Rich presence client
///
/// Construct with a [`ClientConfig`], call [`start`](Self::start) once, push
/// commands from any tick and call [`pump`](Self::pump) (or
/// [`poll_event`](Self::poll_event)) to receive events. Commands issued before
/// the connection is up are sent once Discord answers the handshake.
///
/// # Examples
///
/// ```no_run
/// use presence_link::{ClientConfig, PresenceBuilder, PresenceClient};
///
/// let mut client = PresenceClient::new(ClientConfig::new("1234567890"))?;
/// client.start()?;
///
/// let presence = PresenceBuilder::new()
///     .state("In the menu")
///     .start_timestamp_now()
///     .build();
/// client.set_presence(presence)?;
///
/// for event in client.drain_events() {
///     println!("{:?}", event);
/// }
/// client.stop()?;
/// # Ok::<(), presence_link::PresenceError>(())
/// ```
pub struct PresenceClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    sender: Sender<Event>,
    events: EventQueue,
    worker: Option<JoinHandle<()>>,
    subscriptions: SubscriptionSet,
}

impl PresenceClient {
    /// Create a client using the platform's endpoint transport
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate, and
    /// `UnsupportedPlatform` where Discord has no local IPC.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let connector = default_connector(config.read_timeout, config.socket_dirs.as_deref())?;
        Self::with_connector(config, connector)
    }

    /// Create a client that opens endpoints through `connector`
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = unbounded();
        Ok(Self {
            config,
            connector,
            shared: Arc::new(Shared::new()),
            sender,
            events: EventQueue::new(receiver),
            worker: None,
            subscriptions: SubscriptionSet::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawn the worker thread; the first connection attempt is immediate
    pub fn start(&mut self) -> Result {
        if self.worker.is_some() {
            return Err(PresenceError::AlreadyStarted);
        }
        self.shared.clear_shutdown();

        let worker = Worker::new(
            self.config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            self.sender.clone(),
        );
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(PresenceError::SpawnFailed)?;

        info!("Presence client started for {}", self.config.client_id);
        self.worker = Some(handle);
        Ok(())
    }

    /// Signal the worker, wait for it to release the connection, and suppress
    /// any further reconnects
    ///
    /// Stopping a client that is not running does nothing. Queued commands
    /// stay queued for the next [`start`](Self::start).
    pub fn stop(&mut self) -> Result {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.request_shutdown();
        handle.join().map_err(|_| PresenceError::WorkerPanicked)?;
        debug!("Presence client stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Published session state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Replace the presence shown in Discord
    ///
    /// Updates made before the worker sends the previous one are coalesced;
    /// only the newest value goes out.
    pub fn set_presence(&self, presence: Presence) -> Result<CommandHandle> {
        presence.validate().map_err(PresenceError::InvalidPresence)?;
        Ok(self.shared.queue().set_presence(Some(presence)))
    }

    pub fn clear_presence(&self) -> CommandHandle {
        self.shared.queue().set_presence(None)
    }

    pub fn subscribe(&self, kind: SubscriptionKind) -> CommandHandle {
        self.shared
            .queue()
            .enqueue(OutboundCommand::Subscribe(kind))
    }

    pub fn unsubscribe(&self, kind: SubscriptionKind) -> CommandHandle {
        self.shared
            .queue()
            .enqueue(OutboundCommand::Unsubscribe(kind))
    }

    /// Answer an [`Event::JoinRequest`]
    pub fn respond(&self, user_id: impl Into<String>, accept: bool) -> CommandHandle {
        self.shared.queue().enqueue(OutboundCommand::JoinReply {
            user_id: user_id.into(),
            accept,
        })
    }

    /// Commands waiting for the worker
    pub fn queued_commands(&self) -> usize {
        self.shared.queue().len()
    }

    /// Subscriptions Discord has confirmed, as of the last drained event
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    fn observe(&mut self, event: Event) -> Event {
        self.subscriptions.apply(&event);
        event
    }

    /// Next event, without blocking
    pub fn poll_event(&mut self) -> Option<Event> {
        let event = self.events.poll()?;
        Some(self.observe(event))
    }

    /// Next event, blocking for at most `timeout`
    pub fn wait_event(&mut self, timeout: Duration) -> Option<Event> {
        let event = self.events.wait(timeout)?;
        Some(self.observe(event))
    }

    /// Every event received so far, oldest first
    pub fn drain_events(&mut self) -> Vec<Event> {
        let events = self.events.drain();
        for event in &events {
            self.subscriptions.apply(event);
        }
        events
    }

    /// Deliver queued events to `handler` and return how many were delivered
    pub fn pump<H: EventHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let events = self.drain_events();
        for event in &events {
            event.dispatch_to(handler);
        }
        events.len()
    }

    /// Endpoints that currently exist on this machine
    pub fn discover_endpoints(&self) -> Vec<DiscoveredEndpoint> {
        self.connector.discover(self.config.ipc.max_sockets)
    }
}

impl fmt::Debug for PresenceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceClient")
            .field("client_id", &self.config.client_id)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            debug!("Error while stopping presence client: {}", err);
        }
    }
}
