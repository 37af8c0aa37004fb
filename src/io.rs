//! Blocking data transfer, timeouts, readiness, and socket options.
//!
//! Every operation here is a direct blocking OS call on the calling
//! thread. Sends retry until the whole buffer is delivered or an error
//! occurs; receives make exactly one OS call, where zero bytes on a
//! stream socket is the orderly-close signal and not an error.

use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use libc::{c_int, c_short, c_void, nfds_t, pollfd, socklen_t, POLLIN, POLLOUT};

use crate::addr::Address;
use crate::error::{OsError, Result};
use crate::socket::Socket;

// Peer loss during a send must come back as EPIPE, not take the
// process down with SIGPIPE.
#[cfg(target_os = "linux")]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: c_int = 0;

impl Socket {
    /// Send the whole buffer on a connected socket.
    ///
    /// A single OS call is not guaranteed to consume the buffer, so
    /// this loops over partial writes; the caller either gets all bytes
    /// delivered or an error, never a silent partial send.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let fd = self.as_raw_fd();
        let mut sent = 0usize;
        while sent < data.len() {
            let n = unsafe {
                libc::send(
                    fd,
                    data[sent..].as_ptr() as *const c_void,
                    data.len() - sent,
                    SEND_FLAGS,
                )
            };
            if n < 0 {
                return Err(OsError::last().into());
            }
            sent += n as usize;
        }
        Ok(())
    }

    /// Send the whole buffer to `destination` on a connectionless
    /// socket, with the same partial-write retry as [`Socket::send`].
    pub fn send_to(&self, data: &[u8], destination: &Address) -> Result<()> {
        let (storage, len) = destination.to_wire()?;
        let fd = self.as_raw_fd();
        let mut sent = 0usize;
        while sent < data.len() {
            let n = unsafe {
                libc::sendto(
                    fd,
                    data[sent..].as_ptr() as *const c_void,
                    data.len() - sent,
                    SEND_FLAGS,
                    &storage as *const _ as *const libc::sockaddr,
                    len,
                )
            };
            if n < 0 {
                return Err(OsError::last().into());
            }
            sent += n as usize;
        }
        Ok(())
    }

    /// Receive up to `buffer_size` bytes in one OS call.
    ///
    /// An empty result on a stream socket means the peer closed
    /// cleanly.
    pub fn receive(&self, buffer_size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; buffer_size];
        let n = self.receive_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Receive into a caller-provided buffer; returns the byte count
    /// from a single OS call (zero = orderly close on stream sockets).
    pub fn receive_into(&self, buf: &mut [u8]) -> Result<usize> {
        let n =
            unsafe { libc::recv(self.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };
        if n < 0 {
            return Err(OsError::last().into());
        }
        Ok(n as usize)
    }

    /// Receive up to `buffer_size` bytes along with the sender's
    /// address (meaningful on connectionless sockets).
    pub fn receive_from(&self, buffer_size: usize) -> Result<(Vec<u8>, Address)> {
        let mut buf = vec![0u8; buffer_size];
        let (n, source) = self.receive_from_into(&mut buf)?;
        buf.truncate(n);
        Ok((buf, source))
    }

    /// As [`Socket::receive_from`], into a caller-provided buffer.
    ///
    /// When the OS reports no source record (a connected stream
    /// socket), the source is [`Address::Unspecified`].
    pub fn receive_from_into(&self, buf: &mut [u8]) -> Result<(usize, Address)> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as socklen_t;
        let n = unsafe {
            libc::recvfrom(
                self.as_raw_fd(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                0,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if n < 0 {
            return Err(OsError::last().into());
        }
        let source = if len == 0 {
            Address::Unspecified
        } else {
            Address::from_wire(&storage, len)?
        };
        Ok((n as usize, source))
    }

    /// Set the send timeout. Zero disables it (sends may block
    /// forever).
    pub fn set_send_timeout(&self, timeout: Duration) -> Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        self.inner().set_write_timeout(timeout)?;
        Ok(())
    }

    /// The send timeout as the OS reports it back (the OS may round the
    /// stored value); zero means no timeout.
    pub fn send_timeout(&self) -> Result<Duration> {
        Ok(self.inner().write_timeout()?.unwrap_or(Duration::ZERO))
    }

    /// Set the receive timeout. Zero disables it. A receive that times
    /// out fails with an error classifying as
    /// [`Condition::TimedOut`](crate::Condition::TimedOut).
    pub fn set_receive_timeout(&self, timeout: Duration) -> Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        self.inner().set_read_timeout(timeout)?;
        Ok(())
    }

    /// The receive timeout as the OS reports it back; zero means no
    /// timeout.
    pub fn receive_timeout(&self) -> Result<Duration> {
        Ok(self.inner().read_timeout()?.unwrap_or(Duration::ZERO))
    }

    /// Wait up to `timeout` for this socket to become readable. A zero
    /// timeout polls once without blocking.
    ///
    /// A peer that closed cleanly reports as read-ready, so the next
    /// receive observes the zero-byte close signal.
    pub fn read_ready(&self, timeout: Duration) -> Result<bool> {
        poll_single(self.as_raw_fd(), POLLIN, timeout)
    }

    /// Wait up to `timeout` for this socket to become writable. A zero
    /// timeout polls once without blocking.
    pub fn write_ready(&self, timeout: Duration) -> Result<bool> {
        poll_single(self.as_raw_fd(), POLLOUT, timeout)
    }

    /// How many bytes are queued for reading right now.
    pub fn bytes_ready(&self) -> Result<usize> {
        let mut count: c_int = 0;
        let rc = unsafe { libc::ioctl(self.as_raw_fd(), libc::FIONREAD, &mut count as *mut c_int) };
        if rc < 0 {
            return Err(OsError::last().into());
        }
        Ok(count.max(0) as usize)
    }

    /// Set a boolean socket option.
    pub fn set_option(&self, level: OptionLevel, option: BoolOption, value: bool) -> Result<()> {
        set_sockopt(self.as_raw_fd(), level.raw(), option.raw(), value as c_int)
    }

    /// Read a boolean socket option.
    pub fn option(&self, level: OptionLevel, option: BoolOption) -> Result<bool> {
        Ok(get_sockopt(self.as_raw_fd(), level.raw(), option.raw())? != 0)
    }

    /// Set an integer socket option.
    pub fn set_int_option(&self, level: OptionLevel, option: IntOption, value: i32) -> Result<()> {
        set_sockopt(self.as_raw_fd(), level.raw(), option.raw(), value)
    }

    /// Read an integer socket option. The OS may report a different
    /// value than was set (buffer sizes in particular get adjusted).
    pub fn int_option(&self, level: OptionLevel, option: IntOption) -> Result<i32> {
        get_sockopt(self.as_raw_fd(), level.raw(), option.raw())
    }
}

/// Wait across `sockets` for readability, returning the ready subset.
///
/// One bounded `poll(2)` call covers the whole set; a zero timeout
/// polls once without blocking.
pub fn read_ready_sockets<'a>(
    sockets: &[&'a Socket],
    timeout: Duration,
) -> Result<Vec<&'a Socket>> {
    poll_set(sockets, POLLIN, timeout)
}

/// Wait across `sockets` for writability, returning the ready subset.
pub fn write_ready_sockets<'a>(
    sockets: &[&'a Socket],
    timeout: Duration,
) -> Result<Vec<&'a Socket>> {
    poll_set(sockets, POLLOUT, timeout)
}

fn poll_single(fd: RawFd, events: c_short, timeout: Duration) -> Result<bool> {
    let mut pfd = pollfd {
        fd,
        events,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, poll_millis(timeout)) };
    if rc < 0 {
        return Err(OsError::last().into());
    }
    // Any returned event counts as ready; hangups in particular must
    // surface as read-ready rather than an error.
    Ok(rc > 0)
}

fn poll_set<'a>(
    sockets: &[&'a Socket],
    events: c_short,
    timeout: Duration,
) -> Result<Vec<&'a Socket>> {
    if sockets.is_empty() {
        return Ok(Vec::new());
    }
    let mut pfds: Vec<pollfd> = sockets
        .iter()
        .map(|s| pollfd {
            fd: s.as_raw_fd(),
            events,
            revents: 0,
        })
        .collect();
    let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as nfds_t, poll_millis(timeout)) };
    if rc < 0 {
        return Err(OsError::last().into());
    }
    Ok(sockets
        .iter()
        .zip(&pfds)
        .filter(|(_, pfd)| pfd.revents != 0)
        .map(|(s, _)| *s)
        .collect())
}

fn poll_millis(timeout: Duration) -> c_int {
    timeout.as_millis().min(c_int::MAX as u128) as c_int
}

/// Boolean socket options, mapped 1:1 to the platform constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOption {
    Debug,
    Broadcast,
    ReuseAddress,
    KeepAlive,
    OutOfBandInline,
    DontRoute,
}

impl BoolOption {
    fn raw(self) -> c_int {
        match self {
            BoolOption::Debug => libc::SO_DEBUG,
            BoolOption::Broadcast => libc::SO_BROADCAST,
            BoolOption::ReuseAddress => libc::SO_REUSEADDR,
            BoolOption::KeepAlive => libc::SO_KEEPALIVE,
            BoolOption::OutOfBandInline => libc::SO_OOBINLINE,
            BoolOption::DontRoute => libc::SO_DONTROUTE,
        }
    }
}

/// Integer socket options, mapped 1:1 to the platform constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOption {
    SendBufferSize,
    ReceiveBufferSize,
    ReceiveLowWaterMark,
    SendLowWaterMark,
}

impl IntOption {
    fn raw(self) -> c_int {
        match self {
            IntOption::SendBufferSize => libc::SO_SNDBUF,
            IntOption::ReceiveBufferSize => libc::SO_RCVBUF,
            IntOption::ReceiveLowWaterMark => libc::SO_RCVLOWAT,
            IntOption::SendLowWaterMark => libc::SO_SNDLOWAT,
        }
    }
}

/// Level an option lives at. Only the socket level is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionLevel {
    Socket,
}

impl OptionLevel {
    fn raw(self) -> c_int {
        match self {
            OptionLevel::Socket => libc::SOL_SOCKET,
        }
    }
}

fn set_sockopt(fd: RawFd, level: c_int, name: c_int, value: c_int) -> Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };
    if rc != 0 {
        return Err(OsError::last().into());
    }
    Ok(())
}

fn get_sockopt(fd: RawFd, level: c_int, name: c_int) -> Result<c_int> {
    let mut value: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            &mut value as *mut _ as *mut c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(OsError::last().into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Domain;
    use crate::socket::SocketType;

    #[test]
    fn test_bool_option_round_trip() {
        let sock = Socket::new(Domain::Ipv4, SocketType::Stream, 0).unwrap();
        sock.set_option(OptionLevel::Socket, BoolOption::ReuseAddress, true)
            .unwrap();
        assert!(sock.option(OptionLevel::Socket, BoolOption::ReuseAddress).unwrap());
        sock.set_option(OptionLevel::Socket, BoolOption::ReuseAddress, false)
            .unwrap();
        assert!(!sock.option(OptionLevel::Socket, BoolOption::ReuseAddress).unwrap());
    }

    #[test]
    fn test_int_option_reports_a_value() {
        let sock = Socket::new(Domain::Ipv4, SocketType::Datagram, 0).unwrap();
        sock.set_int_option(OptionLevel::Socket, IntOption::SendBufferSize, 65536)
            .unwrap();
        // The kernel adjusts buffer sizes; only sanity-check the readback.
        assert!(
            sock.int_option(OptionLevel::Socket, IntOption::SendBufferSize)
                .unwrap()
                >= 65536
        );
    }

    #[test]
    fn test_timeout_round_trip_with_rounding() {
        let sock = Socket::new(Domain::Ipv4, SocketType::Datagram, 0).unwrap();
        sock.set_receive_timeout(Duration::from_millis(250)).unwrap();
        let read_back = sock.receive_timeout().unwrap();
        assert!(read_back >= Duration::from_millis(200));
        assert!(read_back <= Duration::from_millis(300));

        sock.set_receive_timeout(Duration::ZERO).unwrap();
        assert_eq!(sock.receive_timeout().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_idle_socket_is_not_read_ready() {
        let mut sock = Socket::new(Domain::Ipv4, SocketType::Datagram, 0).unwrap();
        let any = crate::addr::Ipv4Address::new([127, 0, 0, 1], 0);
        sock.bind(&Address::from(any)).unwrap();
        assert!(!sock.read_ready(Duration::ZERO).unwrap());
    }

    #[test]
    fn test_empty_poll_set() {
        assert!(read_ready_sockets(&[], Duration::ZERO).unwrap().is_empty());
    }
}
