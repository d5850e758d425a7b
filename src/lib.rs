//! # presence-link
//!
//! A Discord Rich Presence client for the local IPC endpoint.
//!
//! A [`PresenceClient`] owns one connection on a background worker thread. The
//! host application pushes presence updates and subscriptions from its own
//! loop and drains typed [`Event`]s once per tick. When Discord goes away the
//! worker reconnects with exponential backoff.
//!
//! Unix-like systems connect over Unix domain sockets and Windows over named
//! pipes.
//!
//! ## Example
//!
//! ```no_run
//! use presence_link::{ClientConfig, Event, PresenceBuilder, PresenceClient, SubscriptionKind};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = PresenceClient::new(ClientConfig::new("1234567890"))?;
//! client.start()?;
//!
//! client.set_presence(
//!     PresenceBuilder::new()
//!         .state("Playing a game")
//!         .details("In the menu")
//!         .start_timestamp_now()
//!         .large_image("game_logo")
//!         .large_text("My Awesome Game")
//!         .build(),
//! )?;
//! client.subscribe(SubscriptionKind::JoinRequest);
//!
//! loop {
//!     while let Some(event) = client.poll_event() {
//!         match event {
//!             Event::JoinRequest(user) => {
//!                 client.respond(user.id, true);
//!             }
//!             Event::Disconnected { reason, .. } => eprintln!("lost Discord: {}", reason),
//!             other => println!("{:?}", other),
//!         }
//!     }
//!     std::thread::sleep(Duration::from_millis(16));
//! #   break;
//! }
//!
//! client.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod ipc;
pub mod nonce;
pub mod presence;
pub mod retry;
pub mod session;
mod worker;

pub use client::PresenceClient;
pub use config::ClientConfig;
pub use dispatch::CommandHandle;
pub use error::{ErrorCategory, PresenceError, Result};
pub use event::{
    Event, EventHandler, ReadyInfo, RemoteError, SubscriptionKind, SubscriptionSet, User,
};
pub use ipc::{EndpointHint, IpcConfig};
pub use presence::{Assets, Button, Party, Presence, PresenceBuilder, Secrets, Timestamps};
pub use retry::ReconnectPolicy;
pub use session::SessionState;
