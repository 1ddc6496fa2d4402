use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// A connected IOP stream. Implements `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations. The
/// reading half and the writing half of one connection are obtained with
/// [`IopStream::try_clone`] and owned by different threads.
pub struct IopStream {
    inner: Arc<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Read for IopStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&*self.inner).read(buf)
    }
}

impl Write for IopStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.inner).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.inner).flush()
    }
}

/// Shuts a connection down without borrowing the stream it came from.
///
/// A thread blocked in a read or write on the stream returns as soon as
/// another thread calls [`ShutdownHandle::shutdown`].
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<TcpStream>,
}

impl ShutdownHandle {
    /// Shut down both halves of the connection. Repeating it is harmless.
    pub fn shutdown(&self) -> Result<()> {
        shutdown_both(&self.inner)
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}

fn shutdown_both(stream: &TcpStream) -> Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => Ok(()),
        // Already torn down by the peer.
        Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl IopStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            inner: Arc::new(stream),
            peer,
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// The server uses this as its idle timer: a read that expires surfaces
    /// as `WouldBlock`/`TimedOut` and is reported as an idle event.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle's algorithm. Frames are written whole, so batching in the
    /// kernel only adds latency.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: Arc::new(cloned),
            peer: self.peer,
        })
    }

    /// Shut down both halves of the connection.
    ///
    /// Returns once the kernel has accepted the shutdown; a reader blocked on
    /// the other clone wakes up with EOF.
    pub fn shutdown(&self) -> Result<()> {
        shutdown_both(&self.inner)
    }

    /// Handle that can shut this connection down from another thread while
    /// this stream is blocked in a read or write.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Address of the remote end, captured when the stream was created.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Local address of this end of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

impl std::fmt::Debug for IopStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IopStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
