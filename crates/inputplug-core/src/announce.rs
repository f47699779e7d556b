//! Announce transport for mirroring dispatched changes
//!
//! Every dispatched change can also be published as one text line on a
//! side channel, so that status bars and window-manager scripts can follow
//! the device hierarchy without being spawned. The channel is best-effort:
//! a sink never blocks the dispatcher and a failed write is dropped.
//!
//! ## Sinks
//!
//! - [`NoAnnounce`]: nothing configured, every line is discarded
//! - [`SocketAnnounce`]: a connected Unix stream socket
//! - [`FileAnnounce`]: a file or FIFO opened for appending
//!
//! ## Addresses
//!
//! Socket addresses use the `unix!/path/to/socket` form familiar from
//! plan9port and wmii; a bare absolute path is accepted as well. The empty
//! address selects the per-user default socket (see [`default_socket_path`]).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use nix::libc;

use crate::error::CoreError;

/// Environment variable holding the default announce address
pub const ADDRESS_ENV: &str = "INPUTPLUG_ADDRESS";

/// A best-effort line sink
pub trait AnnounceSink {
    /// Publish one line. `line` carries no trailing newline.
    fn announce(&mut self, line: &str) -> io::Result<()>;

    /// Whether lines handed to this sink go anywhere
    fn is_live(&self) -> bool {
        true
    }
}

/// Sink used when no announce transport is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnnounce;

impl AnnounceSink for NoAnnounce {
    fn announce(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Lines written to a connected Unix stream socket
#[derive(Debug)]
pub struct SocketAnnounce {
    stream: UnixStream,
    path: PathBuf,
    /// Tail of a line the socket accepted only partly
    pending: Vec<u8>,
}

impl SocketAnnounce {
    /// Connect to the socket at `path`
    ///
    /// The stream is switched to non-blocking mode once connected; a reader
    /// that stops draining the socket loses lines instead of stalling us.
    pub fn connect(path: &Path) -> Result<Self, CoreError> {
        let connect_error = |source| CoreError::AnnounceConnect {
            path: path.to_path_buf(),
            source,
        };

        let stream = UnixStream::connect(path).map_err(connect_error)?;
        Self::from_stream(stream, path).map_err(connect_error)
    }

    fn from_stream(stream: UnixStream, path: &Path) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            path: path.to_path_buf(),
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnnounceSink for SocketAnnounce {
    /// Lines are never split: a line the reader has no room for is dropped
    /// whole, and a partly sent line is completed before the next one.
    fn announce(&mut self, line: &str) -> io::Result<()> {
        if !self.pending.is_empty() {
            let written = write_some(&mut self.stream, &self.pending)?;
            self.pending.drain(..written);
            if !self.pending.is_empty() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
        }

        let buf = framed(line);
        let written = write_some(&mut self.stream, &buf)?;
        if written == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.pending.extend_from_slice(&buf[written..]);
        Ok(())
    }
}

/// Lines appended to a regular file or written into a FIFO
#[derive(Debug)]
pub struct FileAnnounce {
    file: File,
    path: PathBuf,
}

impl FileAnnounce {
    /// Open `path` for appending, creating a regular file if needed
    ///
    /// FIFOs are opened non-blocking, which fails with `ENXIO` when nobody is
    /// reading yet.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o600)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| CoreError::AnnounceOpen {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnnounceSink for FileAnnounce {
    fn announce(&mut self, line: &str) -> io::Result<()> {
        write_line(&mut self.file, line)
    }
}

fn framed(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    buf
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(&framed(line))?;
    writer.flush()
}

/// One non-blocking write; a full buffer counts as zero bytes written
fn write_some<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match writer.write(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
            Err(e) => return Err(e),
        }
    }
}

/// Resolve an announce address to a socket path
///
/// # Errors
///
/// Returns `CoreError::InvalidAddress` for transports other than `unix!`
/// and for relative paths.
pub fn parse_address(address: &str) -> Result<PathBuf, CoreError> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(default_socket_path());
    }

    let path = match address.split_once('!') {
        Some(("unix", path)) => path,
        Some((proto, _)) => {
            return Err(CoreError::InvalidAddress {
                address: address.to_string(),
                reason: format!("unsupported transport '{}'", proto),
            })
        }
        None => address,
    };

    let path = PathBuf::from(path);
    if !path.is_absolute() {
        return Err(CoreError::InvalidAddress {
            address: address.to_string(),
            reason: "socket path must be absolute".to_string(),
        });
    }

    Ok(path)
}

/// Per-user default announce socket
///
/// `$XDG_RUNTIME_DIR/inputplug/event` if the environment variable is set,
/// otherwise `/tmp/inputplug-$UID/event`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("inputplug").join("event")
    } else {
        let uid = nix::unistd::getuid();
        PathBuf::from(format!("/tmp/inputplug-{}", uid)).join("event")
    }
}

/// Open the configured sink
///
/// A socket address takes precedence over a file path. With neither
/// configured the result is [`NoAnnounce`].
pub fn open_sink(
    address: Option<&str>,
    path: Option<&Path>,
) -> Result<Box<dyn AnnounceSink>, CoreError> {
    if let Some(address) = address {
        let socket_path = parse_address(address)?;
        tracing::info!("Connecting to announce socket at {}", socket_path.display());
        return Ok(Box::new(SocketAnnounce::connect(&socket_path)?));
    }

    if let Some(path) = path {
        tracing::info!("Opening announce file {}", path.display());
        return Ok(Box::new(FileAnnounce::open(path)?));
    }

    Ok(Box::new(NoAnnounce))
}
