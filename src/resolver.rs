//! Address text grammar and blocking name resolution.
//!
//! Splits the accepted textual forms into scheme/host/port components
//! and resolves host + service pairs through the system resolver.
//!
//! Accepted shapes, per family:
//! - `"10.0.255.85"` / `"10.0.255.85:255"` / `"localhost:80"`
//! - `"http://example.com"` / `"http://example.com:8080"`
//! - `"::1"` / `"[a:ff00::8d5]:16000"` / `"https://example.com:8443"`
//!
//! Resolution is a single blocking `getaddrinfo` call; the first record
//! wins. A resolver failure is reported as [`Error::Parse`].

use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;

use libc::{c_int, socklen_t};

use crate::error::{Error, Result};
use crate::stack;

/// Components split out of an address string before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostPort<'a> {
    /// URL scheme, passed to the resolver as the service name.
    pub scheme: Option<&'a str>,
    pub host: &'a str,
    /// Explicit trailing port, which overrides the resolved one.
    pub port: Option<u16>,
}

/// Split an IPv4-or-hostname string. `scheme://host[:port]` first;
/// otherwise the `host:port` split applies only when the host is a
/// numeric quad or the literal `localhost` (any other text goes to the
/// resolver whole, colons and all).
pub(crate) fn split_ipv4(text: &str) -> Result<HostPort<'_>> {
    if text.contains("://") {
        let (scheme, rest) = split_scheme(text);
        let (host, port) = split_trailing_port(rest)?;
        return Ok(HostPort { scheme, host, port });
    }
    if let Some(colon) = text.rfind(':') {
        let (head, tail) = (&text[..colon], &text[colon + 1..]);
        if is_ipv4_host(head)
            && !tail.is_empty()
            && tail.len() <= 5
            && tail.bytes().all(|b| b.is_ascii_digit())
        {
            return Ok(HostPort {
                scheme: None,
                host: head,
                port: Some(parse_port(tail)?),
            });
        }
    }
    Ok(HostPort {
        scheme: None,
        host: text,
        port: None,
    })
}

/// A numeric dotted quad (digit counts only, the resolver validates the
/// values) or the literal `localhost`.
fn is_ipv4_host(text: &str) -> bool {
    if text == "localhost" {
        return true;
    }
    let mut fields = 0;
    for field in text.split('.') {
        if field.is_empty() || field.len() > 3 || !field.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        fields += 1;
    }
    fields == 4
}

/// Split an IPv6-or-hostname string. The bracketed `[addr]:port` form
/// takes priority; otherwise `scheme://` with an optional trailing port;
/// otherwise the whole string is a bare address with no port.
pub(crate) fn split_ipv6(text: &str) -> Result<HostPort<'_>> {
    if text.starts_with('[') {
        if let Some(cb) = text.find("]:") {
            let port = parse_port(&text[cb + 2..])?;
            return Ok(HostPort {
                scheme: None,
                host: &text[1..cb],
                port: Some(port),
            });
        }
    }
    if text.contains("://") {
        let (scheme, rest) = split_scheme(text);
        let (host, port) = split_trailing_port(rest)?;
        return Ok(HostPort { scheme, host, port });
    }
    Ok(HostPort {
        scheme: None,
        host: text,
        port: None,
    })
}

fn split_scheme(text: &str) -> (Option<&str>, &str) {
    match text.find("://") {
        Some(i) => (Some(&text[..i]), &text[i + 3..]),
        None => (None, text),
    }
}

/// Split a trailing `:` + 1-5 digit port off `text`. Anything else after
/// the last colon (including a sixth digit) leaves the string whole, so
/// colons inside bare IPv6 text never shed their tail here; a colon
/// directly preceded by another colon is likewise left alone.
fn split_trailing_port(text: &str) -> Result<(&str, Option<u16>)> {
    let Some(colon) = text.rfind(':') else {
        return Ok((text, None));
    };
    let (head, tail) = (&text[..colon], &text[colon + 1..]);
    let digits = !tail.is_empty()
        && tail.len() <= 5
        && tail.bytes().all(|b| b.is_ascii_digit())
        && !head.ends_with(':');
    if !digits {
        return Ok((text, None));
    }
    Ok((head, Some(parse_port(tail)?)))
}

fn parse_port(text: &str) -> Result<u16> {
    if text.is_empty() || text.len() > 5 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Parse(format!("invalid port {:?}", text)));
    }
    text.parse::<u16>()
        .map_err(|_| Error::Parse(format!("port {:?} out of range", text)))
}

/// Resolve a host (and optional service name) to the first matching wire
/// record for the given address family.
pub(crate) fn resolve(
    host: &str,
    service: Option<&str>,
    family: c_int,
) -> Result<(libc::sockaddr_storage, socklen_t)> {
    let _stack = stack::Session::acquire()?;

    let host_c =
        CString::new(host).map_err(|_| Error::Parse(format!("NUL byte in host {:?}", host)))?;
    let service_c = match service {
        Some(s) => {
            Some(CString::new(s).map_err(|_| Error::Parse(format!("NUL byte in service {:?}", s)))?)
        }
        None => None,
    };

    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = family;
    hints.ai_flags = libc::AI_CANONNAME;

    let mut results: *mut libc::addrinfo = ptr::null_mut();
    let rc = unsafe {
        libc::getaddrinfo(
            host_c.as_ptr(),
            service_c.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            &hints,
            &mut results,
        )
    };
    if rc != 0 {
        return Err(resolution_error(rc, host));
    }

    let first = unsafe { &*results };
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = first
        .ai_addrlen
        .min(mem::size_of::<libc::sockaddr_storage>() as socklen_t);
    unsafe {
        ptr::copy_nonoverlapping(
            first.ai_addr as *const u8,
            &mut storage as *mut _ as *mut u8,
            len as usize,
        );
        libc::freeaddrinfo(results);
    }
    Ok((storage, len))
}

fn resolution_error(rc: c_int, host: &str) -> Error {
    if rc == libc::EAI_SYSTEM {
        return Error::Parse(format!(
            "could not resolve {:?}: {}",
            host,
            std::io::Error::last_os_error()
        ));
    }
    let detail = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }.to_string_lossy();
    Error::Parse(format!("could not resolve {:?}: {}", host, detail))
}
