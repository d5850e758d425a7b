use bytes::BytesMut;
use log::trace;
use std::io::{self, Read, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{endpoint_name, Connection, Connector, DiscoveredEndpoint, ReadOutcome};

/// Sub-directories of `XDG_RUNTIME_DIR` where sandboxed Discord builds put their sockets
const SANDBOX_SUBDIRS: [&str; 2] = ["app/com.discordapp.Discord", "snap.discord"];

/// Connects to `discord-ipc-N` Unix domain sockets
#[derive(Debug, Clone)]
pub struct UnixConnector {
    directories: Vec<PathBuf>,
    read_timeout: Duration,
}

impl UnixConnector {
    /// Search the standard runtime and temp directories
    pub fn new(read_timeout: Duration) -> Self {
        Self::with_directories(default_directories(), read_timeout)
    }

    /// Search only `directories`, in order
    pub fn with_directories(directories: Vec<PathBuf>, read_timeout: Duration) -> Self {
        Self {
            directories,
            read_timeout,
        }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    fn socket_path(dir: &Path, index: u8) -> PathBuf {
        dir.join(endpoint_name(index))
    }
}

/// Directories Discord may create its sockets in, most specific first
pub fn default_directories() -> Vec<PathBuf> {
    let mut directories: Vec<PathBuf> = Vec::new();

    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        let runtime = PathBuf::from(runtime);
        directories.push(runtime.clone());
        for sub in SANDBOX_SUBDIRS {
            directories.push(runtime.join(sub));
        }
    } else {
        let uid = unsafe { libc::getuid() };
        let runtime = PathBuf::from(format!("/run/user/{}", uid));
        directories.push(runtime.clone());
        for sub in SANDBOX_SUBDIRS {
            directories.push(runtime.join(sub));
        }
    }

    for env_key in ["TMPDIR", "TMP", "TEMP"] {
        if let Ok(dir) = std::env::var(env_key) {
            directories.push(PathBuf::from(dir));
        }
    }
    directories.push(PathBuf::from("/tmp"));

    let mut unique = Vec::with_capacity(directories.len());
    for dir in directories {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

impl Connector for UnixConnector {
    fn open(&self, index: u8) -> io::Result<Box<dyn Connection>> {
        let mut last_error = None;

        for dir in &self.directories {
            let path = Self::socket_path(dir, index);
            match UnixStream::connect(&path) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    trace!("Opened {}", path.display());
                    return Ok(Box::new(UnixConnection { stream }));
                }
                Err(err) => {
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if err.kind() == io::ErrorKind::PermissionDenied => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Permission denied when connecting to Discord IPC socket. Check file permissions.",
            )),
            Some(err) => Err(err),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no socket directories configured",
            )),
        }
    }

    fn discover(&self, max_sockets: u8) -> Vec<DiscoveredEndpoint> {
        let mut found = Vec::new();
        for index in 0..max_sockets {
            let existing = self
                .directories
                .iter()
                .map(|dir| Self::socket_path(dir, index))
                .find(|path| {
                    std::fs::metadata(path)
                        .map(|meta| meta.file_type().is_socket())
                        .unwrap_or(false)
                });
            if let Some(path) = existing {
                found.push(DiscoveredEndpoint {
                    index,
                    path: path.display().to_string(),
                });
            }
        }
        found
    }
}

/// A connected Unix domain socket with a bounded read timeout
#[derive(Debug)]
pub struct UnixConnection {
    stream: UnixStream,
}

impl Connection for UnixConnection {
    fn try_read(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; 4096];
        match self.stream.read(&mut chunk) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Empty)
            }
            Err(err) => Err(err),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
