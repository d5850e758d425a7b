//! Local endpoint transport
//!
//! A [`Connector`] knows how to open endpoint `n` (`discord-ipc-n`) on the
//! current platform. [`connect`] applies the endpoint-selection policy on top
//! of it. Connections are polled with bounded reads so the owning worker can
//! observe shutdown between attempts.

use bytes::BytesMut;
use log::debug;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PresenceError, Result};
use crate::ipc::protocol::constants;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::{UnixConnection, UnixConnector};
#[cfg(windows)]
pub use windows::{PipeConnection, PipeConnector};

/// Result of a bounded read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were appended to the buffer
    Data(usize),
    /// Nothing arrived within the read timeout
    Empty,
    /// The remote side closed the connection
    Closed,
}

/// An open, bidirectional connection to one endpoint
pub trait Connection: Send {
    /// Append whatever bytes are available to `buf`, waiting at most the read timeout
    fn try_read(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome>;

    /// Write the whole buffer
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Release the connection; further reads report [`ReadOutcome::Closed`]
    fn close(&mut self);
}

/// Opens connections to numbered endpoints
pub trait Connector: Send + Sync {
    fn open(&self, index: u8) -> io::Result<Box<dyn Connection>>;

    /// List the endpoints that currently exist, without connecting to them
    fn discover(&self, _max_sockets: u8) -> Vec<DiscoveredEndpoint> {
        Vec::new()
    }
}

/// An endpoint found by [`Connector::discover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    pub index: u8,
    pub path: String,
}

/// Which endpoint to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointHint {
    /// Try endpoints in ascending order and take the first that accepts
    #[default]
    FirstAvailable,
    /// Only this endpoint (0-9)
    Index(u8),
}

impl fmt::Display for EndpointHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointHint::FirstAvailable => f.write_str("auto"),
            EndpointHint::Index(index) => write!(f, "{}", index),
        }
    }
}

impl FromStr for EndpointHint {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "auto" | "first" => Ok(EndpointHint::FirstAvailable),
            other => match other.parse::<u8>() {
                Ok(index) if index < constants::MAX_IPC_SOCKETS => Ok(EndpointHint::Index(index)),
                _ => Err(PresenceError::InvalidConfig(
                    "endpoint must be \"auto\" or a number from 0 to 9",
                )),
            },
        }
    }
}

/// A connection together with the endpoint it is bound to
pub struct BoundConnection {
    pub endpoint: u8,
    pub connection: Box<dyn Connection>,
}

impl fmt::Debug for BoundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundConnection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// File name of endpoint `index`
pub fn endpoint_name(index: u8) -> String {
    format!("{}{}", constants::IPC_SOCKET_PREFIX, index)
}

/// Connect according to `hint`
///
/// With [`EndpointHint::FirstAvailable`] endpoints `0..max_sockets` are tried in
/// ascending order. If every one refuses, fails with
/// [`PresenceError::NoEndpointFound`].
pub fn connect(
    connector: &dyn Connector,
    hint: EndpointHint,
    max_sockets: u8,
) -> Result<BoundConnection> {
    match hint {
        EndpointHint::Index(index) => connector
            .open(index)
            .map(|connection| BoundConnection {
                endpoint: index,
                connection,
            })
            .map_err(|source| PresenceError::EndpointRefused { index, source }),
        EndpointHint::FirstAvailable => {
            for index in 0..max_sockets {
                match connector.open(index) {
                    Ok(connection) => {
                        debug!("Connected to {}", endpoint_name(index));
                        return Ok(BoundConnection {
                            endpoint: index,
                            connection,
                        });
                    }
                    Err(err) => {
                        debug!("{} unavailable: {}", endpoint_name(index), err);
                    }
                }
            }
            Err(PresenceError::NoEndpointFound {
                attempted: max_sockets,
            })
        }
    }
}

/// The connector for the current platform
///
/// `directories` overrides the Unix socket search path and is ignored on
/// Windows. Fails with [`PresenceError::UnsupportedPlatform`] where Discord
/// has no local IPC transport.
pub fn default_connector(
    read_timeout: Duration,
    directories: Option<&[PathBuf]>,
) -> Result<Arc<dyn Connector>> {
    #[cfg(unix)]
    {
        let connector = match directories {
            Some(dirs) => UnixConnector::with_directories(dirs.to_vec(), read_timeout),
            None => UnixConnector::new(read_timeout),
        };
        Ok(Arc::new(connector))
    }

    #[cfg(windows)]
    {
        let _ = directories;
        Ok(Arc::new(PipeConnector::new(read_timeout)))
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (read_timeout, directories);
        Err(PresenceError::UnsupportedPlatform(std::env::consts::OS))
    }
}
