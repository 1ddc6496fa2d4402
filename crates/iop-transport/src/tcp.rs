use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IopStream;

/// Default bound on an outbound connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP listening endpoint.
///
/// Provides bind/accept on the server side and bounded connect on the client
/// side. Every accepted or connected stream has `TCP_NODELAY` set.
pub struct IopListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl IopListener {
    /// Bind and listen on the given address.
    ///
    /// Port `0` picks an ephemeral port; use [`IopListener::local_addr`] to
    /// learn which one.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let addrs = resolve(addr).map_err(|source| TransportError::Bind {
            addr: "<unresolved>".to_string(),
            source,
        })?;

        let listener = TcpListener::bind(addrs.as_slice()).map_err(|source| {
            TransportError::Bind {
                addr: describe(&addrs),
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: describe(&addrs),
            source,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IopStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(peer = %addr, "accepted connection");
        Ok(IopStream::from_tcp(stream))
    }

    /// Connect to a listening endpoint, giving up after `timeout`.
    ///
    /// Each resolved address is tried in turn. If the last failure was a
    /// timeout the error is [`TransportError::ConnectTimeout`]; no stream is
    /// left open either way.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<IopStream> {
        let addrs = resolve(addr).map_err(|source| TransportError::Connect {
            addr: "<unresolved>".to_string(),
            source,
        })?;

        let mut last_err = None;
        for candidate in &addrs {
            match TcpStream::connect_timeout(candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(peer = %candidate, "connected over tcp");
                    return Ok(IopStream::from_tcp(stream));
                }
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    last_err = Some(TransportError::ConnectTimeout {
                        addr: *candidate,
                        timeout,
                    });
                }
                Err(source) => {
                    last_err = Some(TransportError::Connect {
                        addr: candidate.to_string(),
                        source,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::Connect {
            addr: describe(&addrs),
            source: std::io::Error::new(ErrorKind::InvalidInput, "no addresses to connect to"),
        }))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

fn resolve(addr: impl ToSocketAddrs) -> std::io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "address resolved to nothing",
        ));
    }
    Ok(addrs)
}

fn describe(addrs: &[SocketAddr]) -> String {
    addrs
        .iter()
        .map(SocketAddr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
