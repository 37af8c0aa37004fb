//! Endpoint addresses and their platform wire records.
//!
//! [`Address`] is a closed sum over the supported domains. Each variant
//! converts losslessly to and from the OS's binary address record
//! (`sockaddr_in`, `sockaddr_in6`, `sockaddr_un`) together with the
//! exact record length the socket calls expect, and carries a canonical
//! display name that reparses to an equal value.

use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ptr;
use std::str::FromStr;

use libc::{c_int, socklen_t};

use crate::error::{Error, Result};
use crate::resolver;

/// Address family of an address or socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Domain {
    Unix,
    Ipv4,
    Ipv6,
}

impl Domain {
    /// The platform `AF_*` constant for this domain.
    pub fn family(self) -> c_int {
        match self {
            Domain::Unix => libc::AF_UNIX,
            Domain::Ipv4 => libc::AF_INET,
            Domain::Ipv6 => libc::AF_INET6,
        }
    }

    /// Map a platform `AF_*` constant back to a domain.
    pub fn from_family(family: c_int) -> Option<Domain> {
        match family {
            libc::AF_UNIX => Some(Domain::Unix),
            libc::AF_INET => Some(Domain::Ipv4),
            libc::AF_INET6 => Some(Domain::Ipv6),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Unix => write!(f, "unix"),
            Domain::Ipv4 => write!(f, "IPv4"),
            Domain::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// An IPv4 endpoint: four host-order octets and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ipv4Address {
    octets: [u8; 4],
    port: u16,
}

impl Ipv4Address {
    pub fn new(octets: [u8; 4], port: u16) -> Self {
        Ipv4Address { octets, port }
    }

    /// The wildcard address `0.0.0.0` with the given port.
    pub fn any(port: u16) -> Self {
        Ipv4Address::new([0; 4], port)
    }

    /// Parse from text, resolving the host part through the system
    /// resolver. See [`crate::resolver`] for the accepted shapes.
    pub fn parse(text: &str) -> Result<Self> {
        let hp = resolver::split_ipv4(text)?;
        let (storage, _) = resolver::resolve(hp.host, hp.scheme, libc::AF_INET)?;
        let sin = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in) };
        let mut addr = Ipv4Address::from_sockaddr(sin);
        // An explicit nonzero port beats whatever resolution produced.
        if let Some(port) = hp.port {
            if port != 0 {
                addr.port = port;
            }
        }
        Ok(addr)
    }

    pub(crate) fn from_sockaddr(sin: &libc::sockaddr_in) -> Self {
        Ipv4Address {
            octets: sin.sin_addr.s_addr.to_ne_bytes(),
            port: u16::from_be(sin.sin_port),
        }
    }

    pub(crate) fn to_sockaddr(&self) -> libc::sockaddr_in {
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_addr.s_addr = u32::from_ne_bytes(self.octets);
        sin.sin_port = self.port.to_be();
        sin
    }

    /// Wire-record length: always the full `sockaddr_in`.
    pub fn wire_len(&self) -> socklen_t {
        mem::size_of::<libc::sockaddr_in>() as socklen_t
    }

    pub fn octets(&self) -> [u8; 4] {
        self.octets
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", std::net::Ipv4Addr::from(self.octets), self.port)
    }
}

/// An IPv6 endpoint: eight host-order 16-bit groups, a port, and the
/// opaque flow-info and scope-id fields.
///
/// The groups live in host order in memory and in network order on the
/// wire; encode and decode byte-swap each group symmetrically.
/// `flow_info` and `scope_id` are carried through unchanged and take no
/// part in equality or ordering.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Ipv6Address {
    groups: [u16; 8],
    port: u16,
    flow_info: u32,
    scope_id: u32,
}

impl Ipv6Address {
    pub fn new(groups: [u16; 8], port: u16) -> Self {
        Ipv6Address {
            groups,
            port,
            flow_info: 0,
            scope_id: 0,
        }
    }

    /// The wildcard address `::` with the given port.
    pub fn any(port: u16) -> Self {
        Ipv6Address::new([0; 8], port)
    }

    /// Parse from text. The bracketed `[addr]:port` form takes priority;
    /// see [`crate::resolver`] for the full grammar.
    pub fn parse(text: &str) -> Result<Self> {
        let hp = resolver::split_ipv6(text)?;
        let (storage, _) = resolver::resolve(hp.host, hp.scheme, libc::AF_INET6)?;
        let sin6 = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in6) };
        let mut addr = Ipv6Address::from_sockaddr(sin6);
        if let Some(port) = hp.port {
            if port != 0 {
                addr.port = port;
            }
        }
        Ok(addr)
    }

    pub(crate) fn from_sockaddr(sin6: &libc::sockaddr_in6) -> Self {
        let bytes = sin6.sin6_addr.s6_addr;
        let mut groups = [0u16; 8];
        for (i, group) in groups.iter_mut().enumerate() {
            *group = u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        }
        Ipv6Address {
            groups,
            port: u16::from_be(sin6.sin6_port),
            flow_info: sin6.sin6_flowinfo,
            scope_id: sin6.sin6_scope_id,
        }
    }

    pub(crate) fn to_sockaddr(&self) -> libc::sockaddr_in6 {
        let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        for (i, group) in self.groups.iter().enumerate() {
            let be = group.to_be_bytes();
            sin6.sin6_addr.s6_addr[2 * i] = be[0];
            sin6.sin6_addr.s6_addr[2 * i + 1] = be[1];
        }
        sin6.sin6_port = self.port.to_be();
        sin6.sin6_flowinfo = self.flow_info;
        sin6.sin6_scope_id = self.scope_id;
        sin6
    }

    /// Wire-record length: always the full `sockaddr_in6`.
    pub fn wire_len(&self) -> socklen_t {
        mem::size_of::<libc::sockaddr_in6>() as socklen_t
    }

    pub fn groups(&self) -> [u16; 8] {
        self.groups
    }

    /// The leading three groups (the routing site prefix).
    pub fn site_prefix(&self) -> [u16; 3] {
        [self.groups[0], self.groups[1], self.groups[2]]
    }

    pub fn subnet_id(&self) -> u16 {
        self.groups[3]
    }

    /// The trailing four groups (the interface identifier).
    pub fn interface_id(&self) -> [u16; 4] {
        [self.groups[4], self.groups[5], self.groups[6], self.groups[7]]
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn flow_info(&self) -> u32 {
        self.flow_info
    }

    pub fn scope_id(&self) -> u32 {
        self.scope_id
    }
}

impl PartialEq for Ipv6Address {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups && self.port == other.port
    }
}

impl PartialOrd for Ipv6Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ipv6Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.groups
            .cmp(&other.groups)
            .then(self.port.cmp(&other.port))
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", std::net::Ipv6Addr::from(self.groups), self.port)
    }
}

/// A Unix-domain endpoint.
///
/// The sub-kind is structural: an empty buffer is the unnamed address,
/// a leading NUL byte marks an abstract-namespace name, anything else
/// is a filesystem pathname. Each sub-kind has its own wire-length
/// formula, matching what `accept` and `getsockname` report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixAddress {
    bytes: Vec<u8>,
}

impl UnixAddress {
    /// Take `text` verbatim as a pathname. No normalization is applied;
    /// the bytes are preserved exactly.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() + 1 > sun_path_capacity() {
            return Err(Error::Parse(format!(
                "pathname too long for a unix address ({} bytes, max {})",
                text.len(),
                sun_path_capacity() - 1
            )));
        }
        Ok(UnixAddress {
            bytes: text.as_bytes().to_vec(),
        })
    }

    /// The unnamed address (what an unbound socket reports).
    pub fn unnamed() -> Self {
        UnixAddress { bytes: Vec::new() }
    }

    /// An abstract-namespace address with the given opaque name.
    pub fn abstract_name(name: &[u8]) -> Result<Self> {
        if name.len() + 1 > sun_path_capacity() {
            return Err(Error::Parse(format!(
                "abstract name too long for a unix address ({} bytes)",
                name.len()
            )));
        }
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.push(0);
        bytes.extend_from_slice(name);
        Ok(UnixAddress { bytes })
    }

    pub(crate) fn from_sockaddr(sun: &libc::sockaddr_un, len: socklen_t) -> Self {
        let len = len as usize;
        let offset = sun_path_offset();
        let path: &[libc::c_char] = &sun.sun_path;
        let take = |n: usize| -> Vec<u8> {
            path[..n.min(path.len())].iter().map(|&c| c as u8).collect()
        };
        let bytes = if len > offset + 1 && path[0] != 0 {
            // pathname; the record length counts the trailing NUL
            take(len - offset - 1)
        } else if len > mem::size_of::<libc::sa_family_t>() {
            // abstract; leading NUL is part of the name buffer
            take(len - mem::size_of::<libc::sa_family_t>())
        } else {
            Vec::new()
        };
        UnixAddress { bytes }
    }

    pub(crate) fn to_sockaddr(&self) -> libc::sockaddr_un {
        let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
        sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, &src) in sun.sun_path.iter_mut().zip(self.bytes.iter()) {
            *dst = src as libc::c_char;
        }
        // zeroed tail supplies the pathname's terminating NUL
        sun
    }

    /// Wire-record length for this sub-kind.
    pub fn wire_len(&self) -> socklen_t {
        let len = if self.bytes.is_empty() {
            mem::size_of::<libc::sa_family_t>()
        } else if self.bytes[0] == 0 {
            mem::size_of::<libc::sa_family_t>() + self.bytes.len()
        } else {
            sun_path_offset() + self.bytes.len() + 1
        };
        len as socklen_t
    }

    /// Whether this is a filesystem pathname (as opposed to unnamed or
    /// abstract).
    pub fn is_named(&self) -> bool {
        !self.bytes.is_empty() && self.bytes[0] != 0
    }

    /// The raw buffer, including the leading NUL of an abstract name.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for UnixAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_named() {
            write!(f, "{}", String::from_utf8_lossy(&self.bytes))
        } else if self.bytes.is_empty() {
            write!(f, "unnamed unix address")
        } else {
            write!(f, "abstract unix address")
        }
    }
}

/// A domain-tagged endpoint value.
///
/// The default value is [`Address::Unspecified`]: no payload, a wire
/// length of zero, equal only to itself, and ordered before every
/// populated value.
#[derive(Debug, Clone, Default)]
pub enum Address {
    #[default]
    Unspecified,
    V4(Ipv4Address),
    V6(Ipv6Address),
    Unix(UnixAddress),
}

impl Address {
    /// Parse text into an address, optionally pinned to one domain.
    ///
    /// With no hint, IPv6 is tried first, then IPv4. Unix addresses are
    /// never auto-detected: nearly any text is a valid pathname, so the
    /// caller must ask for the unix domain explicitly.
    pub fn parse(text: &str, hint: Option<Domain>) -> Result<Address> {
        match hint {
            Some(Domain::Ipv4) => Ok(Address::V4(Ipv4Address::parse(text)?)),
            Some(Domain::Ipv6) => Ok(Address::V6(Ipv6Address::parse(text)?)),
            Some(Domain::Unix) => Ok(Address::Unix(UnixAddress::parse(text)?)),
            None => {
                if let Ok(v6) = Ipv6Address::parse(text) {
                    return Ok(Address::V6(v6));
                }
                if let Ok(v4) = Ipv4Address::parse(text) {
                    return Ok(Address::V4(v4));
                }
                Err(Error::Parse(format!(
                    "could not parse {:?} in any domain; a domain hint may be needed",
                    text
                )))
            }
        }
    }

    /// Decode a platform wire record. Dispatches on the family tag; an
    /// unrecognized family is [`Error::UnsupportedFamily`].
    pub fn from_wire(storage: &libc::sockaddr_storage, len: socklen_t) -> Result<Address> {
        match i32::from(storage.ss_family) {
            libc::AF_INET => {
                let sin = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
                Ok(Address::V4(Ipv4Address::from_sockaddr(sin)))
            }
            libc::AF_INET6 => {
                let sin6 = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
                Ok(Address::V6(Ipv6Address::from_sockaddr(sin6)))
            }
            libc::AF_UNIX => {
                let sun = unsafe { &*(storage as *const _ as *const libc::sockaddr_un) };
                Ok(Address::Unix(UnixAddress::from_sockaddr(sun, len)))
            }
            other => Err(Error::UnsupportedFamily(other)),
        }
    }

    /// Encode to a platform wire record, reporting the exact encoded
    /// length (not the storage maximum).
    pub fn to_wire(&self) -> Result<(libc::sockaddr_storage, socklen_t)> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let len = match self {
            Address::Unspecified => {
                return Err(Error::Parse("cannot encode an unspecified address".into()))
            }
            Address::V4(a) => copy_into_storage(&a.to_sockaddr(), a.wire_len(), &mut storage),
            Address::V6(a) => copy_into_storage(&a.to_sockaddr(), a.wire_len(), &mut storage),
            Address::Unix(a) => copy_into_storage(&a.to_sockaddr(), a.wire_len(), &mut storage),
        };
        Ok((storage, len))
    }

    pub fn domain(&self) -> Option<Domain> {
        match self {
            Address::Unspecified => None,
            Address::V4(_) => Some(Domain::Ipv4),
            Address::V6(_) => Some(Domain::Ipv6),
            Address::Unix(_) => Some(Domain::Unix),
        }
    }

    /// Exact wire-record length; zero for the unspecified value.
    pub fn wire_len(&self) -> socklen_t {
        match self {
            Address::Unspecified => 0,
            Address::V4(a) => a.wire_len(),
            Address::V6(a) => a.wire_len(),
            Address::Unix(a) => a.wire_len(),
        }
    }

    /// Canonical display name. Reparsing it with the same (or no)
    /// domain hint yields an equal address, except for the unnamed and
    /// abstract unix sub-kinds, which have descriptive names only.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn as_ipv4(&self) -> Result<&Ipv4Address> {
        match self {
            Address::V4(a) => Ok(a),
            other => Err(Error::DomainMismatch {
                expected: Domain::Ipv4,
                found: other.domain(),
            }),
        }
    }

    pub fn as_ipv6(&self) -> Result<&Ipv6Address> {
        match self {
            Address::V6(a) => Ok(a),
            other => Err(Error::DomainMismatch {
                expected: Domain::Ipv6,
                found: other.domain(),
            }),
        }
    }

    pub fn as_unix(&self) -> Result<&UnixAddress> {
        match self {
            Address::Unix(a) => Ok(a),
            other => Err(Error::DomainMismatch {
                expected: Domain::Unix,
                found: other.domain(),
            }),
        }
    }
}

fn copy_into_storage<T>(src: &T, len: socklen_t, storage: &mut libc::sockaddr_storage) -> socklen_t {
    debug_assert!(len as usize <= mem::size_of::<libc::sockaddr_storage>());
    unsafe {
        ptr::copy_nonoverlapping(
            src as *const T as *const u8,
            storage as *mut _ as *mut u8,
            len as usize,
        );
    }
    len
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Address::Unspecified, Address::Unspecified) => true,
            (Address::V4(a), Address::V4(b)) => a == b,
            (Address::V6(a), Address::V6(b)) => a == b,
            (Address::Unix(a), Address::Unix(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Address {}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        // Domain tags order by their platform AF numbering, with the
        // unspecified value before everything.
        fn rank(addr: &Address) -> c_int {
            addr.domain().map_or(libc::AF_UNSPEC, Domain::family)
        }
        match (self, other) {
            (Address::V4(a), Address::V4(b)) => a.cmp(b),
            (Address::V6(a), Address::V6(b)) => a.cmp(b),
            (Address::Unix(a), Address::Unix(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unspecified => write!(f, "unspecified address"),
            Address::V4(a) => a.fmt(f),
            Address::V6(a) => a.fmt(f),
            Address::Unix(a) => a.fmt(f),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s, None)
    }
}

impl From<Ipv4Address> for Address {
    fn from(addr: Ipv4Address) -> Self {
        Address::V4(addr)
    }
}

impl From<Ipv6Address> for Address {
    fn from(addr: Ipv6Address) -> Self {
        Address::V6(addr)
    }
}

impl From<UnixAddress> for Address {
    fn from(addr: UnixAddress) -> Self {
        Address::Unix(addr)
    }
}

impl TryFrom<Address> for Ipv4Address {
    type Error = Error;

    fn try_from(addr: Address) -> Result<Self> {
        addr.as_ipv4().copied()
    }
}

impl TryFrom<Address> for Ipv6Address {
    type Error = Error;

    fn try_from(addr: Address) -> Result<Self> {
        addr.as_ipv6().copied()
    }
}

impl TryFrom<Address> for UnixAddress {
    type Error = Error;

    fn try_from(addr: Address) -> Result<Self> {
        addr.as_unix().cloned()
    }
}

/// Offset of `sun_path` within `sockaddr_un`.
pub(crate) fn sun_path_offset() -> usize {
    let un = mem::MaybeUninit::<libc::sockaddr_un>::uninit();
    let base = un.as_ptr() as usize;
    let path = unsafe { ptr::addr_of!((*un.as_ptr()).sun_path) } as usize;
    path - base
}

fn sun_path_capacity() -> usize {
    mem::size_of::<libc::sockaddr_un>() - sun_path_offset()
}
