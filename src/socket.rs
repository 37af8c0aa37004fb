//! Socket handles and their lifecycle.
//!
//! A [`Socket`] owns exactly one OS descriptor. Domain, type, and
//! protocol are fixed at construction; bind/listen/accept/connect drive
//! the usual state machine, and dropping the handle shuts the socket
//! down, closes the descriptor, and removes a bound Unix pathname.
//! Handles are move-only values: Rust's move semantics leave no stale
//! source to double-close.

use std::ffi::OsStr;
use std::fmt;
use std::mem;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

use libc::c_int;
use log::debug;

use crate::addr::{Address, Domain};
use crate::error::{Error, OsError, Result};
use crate::stack;

/// Default `listen` backlog.
pub const DEFAULT_BACKLOG: c_int = 0xFF;

/// Communication semantics of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    /// Ordered, reliable byte stream (TCP in the IP world).
    Stream,
    /// Unordered datagrams, valid-if-delivered (UDP in the IP world).
    Datagram,
    /// Ordered, reliable datagrams.
    SeqPacket,
    /// Reliable but unordered datagrams.
    ReliableDatagram,
    /// Raw access to the socket layer.
    Raw,
}

impl SocketType {
    /// The platform `SOCK_*` constant for this type.
    pub fn raw(self) -> c_int {
        match self {
            SocketType::Stream => libc::SOCK_STREAM,
            SocketType::Datagram => libc::SOCK_DGRAM,
            SocketType::SeqPacket => libc::SOCK_SEQPACKET,
            SocketType::ReliableDatagram => libc::SOCK_RDM,
            SocketType::Raw => libc::SOCK_RAW,
        }
    }

    /// Whether this type exchanges addressed messages rather than
    /// holding a connection.
    pub fn connectionless(self) -> bool {
        matches!(
            self,
            SocketType::Datagram | SocketType::ReliableDatagram | SocketType::Raw
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Stream => write!(f, "stream"),
            SocketType::Datagram => write!(f, "datagram"),
            SocketType::SeqPacket => write!(f, "seq"),
            SocketType::ReliableDatagram => write!(f, "rdm"),
            SocketType::Raw => write!(f, "raw"),
        }
    }
}

/// An owned, blocking socket.
pub struct Socket {
    inner: socket2::Socket,
    domain: Domain,
    ty: SocketType,
    protocol: c_int,
    listening: bool,
    /// Unix pathname this handle bound, unlinked at drop.
    bound_path: Option<PathBuf>,
    _stack: stack::Session,
}

impl Socket {
    /// Open a new OS socket.
    pub fn new(domain: Domain, ty: SocketType, protocol: c_int) -> Result<Socket> {
        let session = stack::Session::acquire()?;
        let inner = socket2::Socket::new(
            socket2::Domain::from(domain.family()),
            socket2::Type::from(ty.raw()),
            (protocol != 0).then(|| socket2::Protocol::from(protocol)),
        )?;
        debug!(
            "socket {}: created ({} {})",
            inner.as_raw_fd(),
            domain,
            ty
        );
        Ok(Socket {
            inner,
            domain,
            ty,
            protocol,
            listening: false,
            bound_path: None,
            _stack: session,
        })
    }

    fn wrap(inner: socket2::Socket, domain: Domain, ty: SocketType, protocol: c_int) -> Result<Socket> {
        Ok(Socket {
            inner,
            domain,
            ty,
            protocol,
            listening: false,
            bound_path: None,
            _stack: stack::Session::acquire()?,
        })
    }

    /// A pair of connected Unix-domain sockets (`socketpair(2)`).
    pub fn unix_pair(ty: SocketType, protocol: c_int) -> Result<(Socket, Socket)> {
        let mut fds = [0 as c_int; 2];
        let rc = unsafe { libc::socketpair(libc::AF_UNIX, ty.raw(), protocol, fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(OsError::last().into());
        }
        let first = unsafe { socket2::Socket::from_raw_fd(fds[0]) };
        let second = unsafe { socket2::Socket::from_raw_fd(fds[1]) };
        debug!("socket pair created ({}, {})", fds[0], fds[1]);
        Ok((
            Socket::wrap(first, Domain::Unix, ty, protocol)?,
            Socket::wrap(second, Domain::Unix, ty, protocol)?,
        ))
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn socket_type(&self) -> SocketType {
        self.ty
    }

    pub fn protocol(&self) -> c_int {
        self.protocol
    }

    /// Bind to a local address. The address domain must match the
    /// socket's; a mismatch fails before any OS call is made.
    pub fn bind(&mut self, address: &Address) -> Result<()> {
        match address.domain() {
            Some(d) if d == self.domain => {}
            found => {
                return Err(Error::DomainMismatch {
                    expected: self.domain,
                    found,
                })
            }
        }
        let (storage, len) = address.to_wire()?;
        let sockaddr = unsafe { socket2::SockAddr::new(storage, len) };
        self.inner.bind(&sockaddr)?;
        if let Address::Unix(unix) = address {
            if unix.is_named() {
                self.bound_path = Some(PathBuf::from(OsStr::from_bytes(unix.as_bytes())));
            }
        }
        debug!("socket {}: bound to {}", self.inner.as_raw_fd(), address);
        Ok(())
    }

    /// Start listening for connections (stream and seq-packet types).
    pub fn listen(&mut self, backlog: c_int) -> Result<()> {
        self.inner.listen(backlog)?;
        self.listening = true;
        debug!(
            "socket {}: listening (backlog {})",
            self.inner.as_raw_fd(),
            backlog
        );
        Ok(())
    }

    /// Accept one pending connection, returning a new handle that
    /// inherits this socket's domain, type, and protocol.
    ///
    /// Calling this on a socket that is not listening is
    /// [`Error::NotListening`], distinct from an OS-level accept
    /// failure.
    pub fn accept(&self) -> Result<Socket> {
        if !self.listening {
            return Err(Error::NotListening);
        }
        let (conn, _) = self.inner.accept()?;
        debug!(
            "socket {}: accepted connection on fd {}",
            self.inner.as_raw_fd(),
            conn.as_raw_fd()
        );
        Socket::wrap(conn, self.domain, self.ty, self.protocol)
    }

    /// Connect to a remote address.
    pub fn connect(&mut self, address: &Address) -> Result<()> {
        let (storage, len) = address.to_wire()?;
        let sockaddr = unsafe { socket2::SockAddr::new(storage, len) };
        self.inner.connect(&sockaddr)?;
        debug!("socket {}: connected to {}", self.inner.as_raw_fd(), address);
        Ok(())
    }

    /// The address this socket is bound to, as the OS reports it.
    pub fn local_address(&self) -> Result<Address> {
        decode_sockaddr(&self.inner.local_addr()?)
    }

    /// The peer's address, as the OS reports it.
    pub fn connected_address(&self) -> Result<Address> {
        decode_sockaddr(&self.inner.peer_addr()?)
    }

    pub(crate) fn inner(&self) -> &socket2::Socket {
        &self.inner
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("fd", &self.inner.as_raw_fd())
            .field("domain", &self.domain)
            .field("type", &self.ty)
            .field("protocol", &self.protocol)
            .field("listening", &self.listening)
            .finish()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        // Teardown never raises: shutdown and close failures are
        // discarded, and the descriptor closes when `inner` drops.
        let _ = self.inner.shutdown(Shutdown::Both);
        if let Some(path) = self.bound_path.take() {
            debug!(
                "socket {}: unlinking bound path {}",
                self.inner.as_raw_fd(),
                path.display()
            );
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Copy a `socket2` address into storage and decode it through the
/// wire codec, so `getsockname`/`getpeername` results go through the
/// same path as every other record.
pub(crate) fn decode_sockaddr(sockaddr: &socket2::SockAddr) -> Result<Address> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = sockaddr
        .len()
        .min(mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t);
    unsafe {
        ptr::copy_nonoverlapping(
            sockaddr.as_ptr() as *const u8,
            &mut storage as *mut _ as *mut u8,
            len as usize,
        );
    }
    Address::from_wire(&storage, len)
}
