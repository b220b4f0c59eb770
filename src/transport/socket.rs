//! TCP and Unix domain socket listeners and streams.
//!
//! # Example
//!
//! ```ignore
//! use smartnet::transport::{Listener, Network};
//!
//! let listener = Listener::bind(Network::Tcp, "127.0.0.1:0").await?;
//! let conn = listener.accept().await?;
//! let (reader, writer) = conn.into_split();
//! ```

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, SmartError};

/// Boxed read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Socket family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    /// Unix domain socket; the address is a filesystem path.
    Unix,
}

impl std::str::FromStr for Network {
    type Err = SmartError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(SmartError::Config(format!("unsupported network `{}`", other))),
        }
    }
}

/// A bound listener.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(unix_impl::UnixSocketListener),
}

impl Listener {
    /// Bind `address` on `network`.
    ///
    /// For Unix sockets any stale socket file at the path is removed first.
    pub async fn bind(network: Network, address: &str) -> Result<Self> {
        match network {
            Network::Tcp => Ok(Listener::Tcp(TcpListener::bind(address).await?)),
            #[cfg(unix)]
            Network::Unix => Ok(Listener::Unix(unix_impl::UnixSocketListener::bind(
                address,
            )?)),
            #[cfg(not(unix))]
            Network::Unix => Err(SmartError::Config(
                "unix sockets are not supported on this platform".into(),
            )),
        }
    }

    /// Accept one connection.
    pub async fn accept(&self) -> Result<Connection> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok(Connection::from_tcp(stream, peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => listener.accept().await,
        }
    }

    /// Local address as a string (`ip:port` or socket path).
    pub fn local_addr(&self) -> Result<String> {
        match self {
            Listener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Listener::Unix(listener) => Ok(listener.path().to_string()),
        }
    }
}

/// An accepted or dialed connection, not yet split.
pub struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    peer: String,
}

impl Connection {
    fn from_tcp(stream: TcpStream, peer: String) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer,
        }
    }

    /// Build a connection from arbitrary halves (in-memory transports, tests).
    pub fn from_parts(reader: BoxedReader, writer: BoxedWriter, peer: impl Into<String>) -> Self {
        Self {
            reader,
            writer,
            peer: peer.into(),
        }
    }

    /// Remote address, or the socket path for Unix sockets.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter, String) {
        (self.reader, self.writer, self.peer)
    }
}

/// Dial `address`, failing with [`SmartError::ConnectTimeout`] after `timeout`.
pub async fn connect(network: Network, address: &str, timeout: Duration) -> Result<Connection> {
    tokio::time::timeout(timeout, dial(network, address))
        .await
        .map_err(|_| SmartError::ConnectTimeout(timeout))?
}

async fn dial(network: Network, address: &str) -> Result<Connection> {
    match network {
        Network::Tcp => {
            let stream = TcpStream::connect(address).await?;
            let _ = stream.set_nodelay(true);
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| address.to_string());
            Ok(Connection::from_tcp(stream, peer))
        }
        #[cfg(unix)]
        Network::Unix => {
            let stream = tokio::net::UnixStream::connect(address).await?;
            let (reader, writer) = stream.into_split();
            Ok(Connection::from_parts(
                Box::new(reader),
                Box::new(writer),
                address,
            ))
        }
        #[cfg(not(unix))]
        Network::Unix => Err(SmartError::Config(
            "unix sockets are not supported on this platform".into(),
        )),
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::UnixListener;

    /// Unix domain socket listener that removes its socket file on drop.
    pub struct UnixSocketListener {
        listener: UnixListener,
        path: String,
    }

    impl UnixSocketListener {
        pub fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }
            let listener = UnixListener::bind(path)?;
            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        pub async fn accept(&self) -> Result<Connection> {
            let (stream, _addr) = self.listener.accept().await?;
            let (reader, writer) = stream.into_split();
            Ok(Connection::from_parts(
                Box::new(reader),
                Box::new(writer),
                self.path.clone(),
            ))
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for UnixSocketListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
