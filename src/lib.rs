//! Uniform endpoint addresses and blocking socket I/O.
//!
//! This crate represents IPv4, IPv6, and Unix-domain endpoints behind
//! one [`Address`] value, converts them losslessly to and from the
//! platform's binary address records, and drives blocking socket I/O
//! (bind/listen/accept/connect, send/receive, timeouts, readiness
//! polling) through the resource-safe [`Socket`] handle.
//!
//! There is no scheduler and no internal locking: every operation is a
//! direct blocking OS call on the calling thread, and callers wanting
//! concurrency spawn a thread per blocking operation. Handles are
//! move-only; dropping one shuts the socket down, closes the
//! descriptor, and removes a bound Unix pathname.
//!
//! # Examples
//!
//! ```
//! use unisock::{Address, Domain, Socket, SocketType, DEFAULT_BACKLOG};
//!
//! # fn main() -> unisock::Result<()> {
//! let mut listener = Socket::new(Domain::Ipv4, SocketType::Stream, 0)?;
//! listener.bind(&Address::parse("127.0.0.1:0", Some(Domain::Ipv4))?)?;
//! listener.listen(DEFAULT_BACKLOG)?;
//!
//! let mut client = Socket::new(Domain::Ipv4, SocketType::Stream, 0)?;
//! client.connect(&listener.local_address()?)?;
//! let peer = listener.accept()?;
//!
//! client.send(b"ping")?;
//! assert_eq!(peer.receive(16)?, b"ping".to_vec());
//! # Ok(())
//! # }
//! ```

mod addr;
mod error;
mod io;
mod resolver;
mod socket;
mod stack;

pub use addr::{Address, Domain, Ipv4Address, Ipv6Address, UnixAddress};
pub use error::{Condition, Error, OsError, Result};
pub use io::{read_ready_sockets, write_ready_sockets, BoolOption, IntOption, OptionLevel};
pub use socket::{Socket, SocketType, DEFAULT_BACKLOG};
