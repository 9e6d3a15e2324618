//! Manager addresses and connecting to them.
//!
//! Addresses use the manager's `<family>:<location>` syntax:
//!
//! | Address                    | Transport                         |
//! |----------------------------|-----------------------------------|
//! | `unxs:@murphy-resource-native` | abstract Unix socket (Linux)  |
//! | `unxs:/run/resmgr.sock`    | Unix socket on the filesystem     |
//! | `tcp4:127.0.0.1:4000`      | TCP over IPv4                     |
//! | `tcp6:[::1]:4000`          | TCP over IPv6                     |
//!
//! # Example
//!
//! ```
//! use resmgr_client::transport::{Address, DEFAULT_ADDRESS};
//!
//! let addr: Address = DEFAULT_ADDRESS.parse().unwrap();
//! assert_eq!(addr, Address::Abstract("murphy-resource-native".into()));
//! assert_eq!(addr.to_string(), DEFAULT_ADDRESS);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{ResmgrError, Result};

/// Address the native resource protocol listens on by default.
pub const DEFAULT_ADDRESS: &str = "unxs:@murphy-resource-native";

/// A connected byte stream to the manager.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Type-erased connected stream.
pub type BoxedTransport = Box<dyn Transport>;

/// A parsed manager address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Linux abstract-namespace Unix socket (`unxs:@name`).
    Abstract(String),
    /// Filesystem Unix socket (`unxs:/path`).
    Unix(PathBuf),
    /// TCP over IPv4 (`tcp4:host:port`).
    Tcp4 { host: String, port: u16 },
    /// TCP over IPv6 (`tcp6:[host]:port`).
    Tcp6 { host: String, port: u16 },
}

impl Address {
    /// Parse an address string.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || ResmgrError::InvalidAddress(s.to_string());
        let (family, location) = s.split_once(':').ok_or_else(invalid)?;
        if location.is_empty() {
            return Err(invalid());
        }

        match family {
            "unxs" => match location.strip_prefix('@') {
                Some("") => Err(invalid()),
                Some(name) => Ok(Self::Abstract(name.to_string())),
                None => Ok(Self::Unix(PathBuf::from(location))),
            },
            "tcp4" => {
                let (host, port) = split_host_port(location).ok_or_else(invalid)?;
                Ok(Self::Tcp4 { host, port })
            }
            "tcp6" => {
                let (host, port) = split_host_port(location).ok_or_else(invalid)?;
                Ok(Self::Tcp6 { host, port })
            }
            _ => Err(invalid()),
        }
    }

    /// Open a stream to this address.
    pub async fn connect(&self) -> Result<BoxedTransport> {
        tracing::debug!("Connecting to {}", self);
        match self {
            Self::Abstract(name) => connect_abstract(name).await,
            Self::Unix(path) => connect_unix(path).await,
            Self::Tcp4 { host, port } => connect_tcp(host, *port, true).await,
            Self::Tcp6 { host, port } => connect_tcp(host, *port, false).await,
        }
    }
}

impl FromStr for Address {
    type Err = ResmgrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abstract(name) => write!(f, "unxs:@{name}"),
            Self::Unix(path) => write!(f, "unxs:{}", path.display()),
            Self::Tcp4 { host, port } => write!(f, "tcp4:{host}:{port}"),
            Self::Tcp6 { host, port } => write!(f, "tcp6:[{host}]:{port}"),
        }
    }
}

/// Split `host:port` or `[host]:port` at the last colon.
fn split_host_port(location: &str) -> Option<(String, u16)> {
    let (host, port) = location.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

async fn connect_tcp(host: &str, port: u16, v4: bool) -> Result<BoxedTransport> {
    let mut last_err = None;

    for addr in tokio::net::lookup_host((host, port)).await? {
        if addr.is_ipv4() != v4 {
            continue;
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(Box::new(stream));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(match last_err {
        Some(e) => ResmgrError::Io(e),
        None => ResmgrError::InvalidAddress(format!(
            "{host} has no {} address",
            if v4 { "IPv4" } else { "IPv6" }
        )),
    })
}

#[cfg(unix)]
async fn connect_unix(path: &std::path::Path) -> Result<BoxedTransport> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(path: &std::path::Path) -> Result<BoxedTransport> {
    Err(ResmgrError::InvalidAddress(format!(
        "unix sockets are not available on this platform: {}",
        path.display()
    )))
}

#[cfg(target_os = "linux")]
async fn connect_abstract(name: &str) -> Result<BoxedTransport> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixStream};

    let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
    let stream = tokio::task::spawn_blocking(move || {
        let stream = UnixStream::connect_addr(&addr)?;
        stream.set_nonblocking(true)?;
        Ok::<_, std::io::Error>(stream)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(Box::new(tokio::net::UnixStream::from_std(stream)?))
}

#[cfg(not(target_os = "linux"))]
async fn connect_abstract(name: &str) -> Result<BoxedTransport> {
    Err(ResmgrError::InvalidAddress(format!(
        "abstract sockets are only available on Linux: @{name}"
    )))
}
