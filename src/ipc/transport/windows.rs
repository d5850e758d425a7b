use bytes::BytesMut;
use log::trace;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};
use tokio::runtime::{Builder, Runtime};

use super::{endpoint_name, Connection, Connector, DiscoveredEndpoint, ReadOutcome};

const PIPE_ROOT: &str = r"\\.\pipe\";

/// Connects to `\\.\pipe\discord-ipc-N` named pipes
///
/// Synchronous pipe handles serialize reads and writes on the same file
/// object, so each connection drives an overlapped tokio pipe client on a
/// private current-thread runtime instead.
#[derive(Debug, Clone)]
pub struct PipeConnector {
    read_timeout: Duration,
}

impl PipeConnector {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Connector for PipeConnector {
    fn open(&self, index: u8) -> io::Result<Box<dyn Connection>> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let path = format!("{}{}", PIPE_ROOT, endpoint_name(index));

        let pipe = {
            let _guard = runtime.enter();
            ClientOptions::new().open(&path)
        };

        match pipe {
            Ok(pipe) => {
                trace!("Opened {}", path);
                Ok(Box::new(PipeConnection {
                    runtime,
                    pipe,
                    read_timeout: self.read_timeout,
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Permission denied when connecting to Discord IPC pipe. Is Discord running with the right permissions?",
            )),
            Err(err) => Err(err),
        }
    }

    fn discover(&self, max_sockets: u8) -> Vec<DiscoveredEndpoint> {
        let names: Vec<String> = match std::fs::read_dir(PIPE_ROOT) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => return Vec::new(),
        };

        (0..max_sockets)
            .filter(|index| names.iter().any(|name| *name == endpoint_name(*index)))
            .map(|index| DiscoveredEndpoint {
                index,
                path: format!("{}{}", PIPE_ROOT, endpoint_name(index)),
            })
            .collect()
    }
}

/// A connected named pipe with a bounded read timeout
#[derive(Debug)]
pub struct PipeConnection {
    runtime: Runtime,
    pipe: NamedPipeClient,
    read_timeout: Duration,
}

impl Connection for PipeConnection {
    fn try_read(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; 4096];
        let chunk_ref = &mut chunk;
        let pipe = &mut self.pipe;
        let timeout = self.read_timeout;

        let result = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, pipe.read(chunk_ref)).await });

        match result {
            Err(_elapsed) => Ok(ReadOutcome::Empty),
            Ok(Ok(0)) => Ok(ReadOutcome::Closed),
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => Ok(ReadOutcome::Closed),
            Ok(Err(err)) => Err(err),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let pipe = &mut self.pipe;
        self.runtime.block_on(async move {
            pipe.write_all(bytes).await?;
            pipe.flush().await
        })
    }

    fn close(&mut self) {
        // Named pipe handles are released when the client is dropped
    }
}
