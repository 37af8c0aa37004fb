//! Error taxonomy and platform error-code mapping.
//!
//! All fallible operations in this crate return [`Result`]. OS-level
//! failures are wrapped in [`OsError`], which stores the raw platform
//! code after normalization so the same logical failure compares equal
//! across platforms, and classifies it into the portable [`Condition`]
//! vocabulary.

use std::fmt;
use std::io;

use crate::addr::Domain;

/// Result type for all socket and address operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by address handling and socket I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed address text, or the name resolver failed.
    #[error("invalid address: {0}")]
    Parse(String),

    /// A typed cast or a bind was attempted across mismatched domains.
    #[error("address domain mismatch (expected {expected}, found {})", domain_label(.found))]
    DomainMismatch {
        expected: Domain,
        found: Option<Domain>,
    },

    /// A wire record carried an address-family tag this crate does not decode.
    #[error("unsupported address family {0}")]
    UnsupportedFamily(i32),

    /// `accept` was called on a socket that is not listening.
    #[error("socket is not listening")]
    NotListening,

    /// A mapped platform error.
    #[error(transparent)]
    Os(#[from] OsError),
}

fn domain_label(found: &Option<Domain>) -> String {
    match found {
        Some(d) => d.to_string(),
        None => "unspecified".to_string(),
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Os(OsError::from_raw(err.raw_os_error().unwrap_or(0)))
    }
}

/// A raw platform error code, normalized to POSIX numbering.
///
/// Platforms whose socket error codes sit at a fixed offset above the
/// POSIX values for the common subset have that offset removed on
/// construction, so `OsError`s for the same logical failure compare
/// equal regardless of origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsError {
    code: i32,
}

impl OsError {
    /// Wrap a raw platform error code.
    pub fn from_raw(code: i32) -> Self {
        OsError {
            code: normalize(code),
        }
    }

    /// Capture the calling thread's current OS error.
    pub fn last() -> Self {
        OsError::from_raw(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// The normalized error code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Classify this error into the portable condition set.
    pub fn condition(&self) -> Condition {
        match self.code {
            libc::EADDRINUSE => Condition::AddressInUse,
            libc::ECONNREFUSED => Condition::ConnectionRefused,
            libc::ECONNRESET => Condition::ConnectionReset,
            libc::ECONNABORTED => Condition::ConnectionAborted,
            libc::ENOTCONN => Condition::NotConnected,
            libc::EPIPE => Condition::BrokenPipe,
            libc::EAFNOSUPPORT => Condition::UnsupportedFamily,
            libc::ETIMEDOUT | libc::EAGAIN => Condition::TimedOut,
            #[allow(unreachable_patterns)] // EWOULDBLOCK aliases EAGAIN on most targets
            libc::EWOULDBLOCK => Condition::TimedOut,
            _ => Condition::Other,
        }
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (os error {})",
            io::Error::from_raw_os_error(self.code),
            self.code
        )
    }
}

impl std::error::Error for OsError {}

/// Portable classification of an [`OsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    AddressInUse,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    /// The operation would block or its timeout expired. The OS reports
    /// an expired SO_RCVTIMEO/SO_SNDTIMEO as either EAGAIN or ETIMEDOUT
    /// depending on platform; both land here.
    TimedOut,
    NotConnected,
    BrokenPipe,
    UnsupportedFamily,
    Other,
}

impl Condition {
    /// Whether this condition is an ordinary way to lose a peer rather
    /// than a local programming error.
    pub fn is_disconnect(self) -> bool {
        matches!(
            self,
            Condition::ConnectionReset
                | Condition::ConnectionAborted
                | Condition::BrokenPipe
                | Condition::NotConnected
        )
    }
}

/// Map offset socket-error numbering back onto POSIX values.
#[cfg(windows)]
fn normalize(code: i32) -> i32 {
    // The 10000..=10061 range mirrors errno values shifted by 10000.
    if (10001..=10061).contains(&code) {
        code - 10000
    } else {
        code
    }
}

#[cfg(not(windows))]
fn normalize(code: i32) -> i32 {
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_classification() {
        assert_eq!(
            OsError::from_raw(libc::EADDRINUSE).condition(),
            Condition::AddressInUse
        );
        assert_eq!(
            OsError::from_raw(libc::ECONNREFUSED).condition(),
            Condition::ConnectionRefused
        );
        assert_eq!(
            OsError::from_raw(libc::EAGAIN).condition(),
            Condition::TimedOut
        );
        assert_eq!(
            OsError::from_raw(libc::ETIMEDOUT).condition(),
            Condition::TimedOut
        );
        assert_eq!(
            OsError::from_raw(libc::ENOTCONN).condition(),
            Condition::NotConnected
        );
        assert_eq!(OsError::from_raw(libc::ENOENT).condition(), Condition::Other);
    }

    #[test]
    fn test_equal_codes_compare_equal() {
        assert_eq!(
            OsError::from_raw(libc::ECONNRESET),
            OsError::from_raw(libc::ECONNRESET)
        );
        assert_ne!(
            OsError::from_raw(libc::ECONNRESET),
            OsError::from_raw(libc::EPIPE)
        );
    }

    #[test]
    fn test_disconnect_conditions() {
        assert!(Condition::ConnectionReset.is_disconnect());
        assert!(Condition::BrokenPipe.is_disconnect());
        assert!(!Condition::AddressInUse.is_disconnect());
        assert!(!Condition::TimedOut.is_disconnect());
    }

    #[test]
    fn test_io_error_converts_to_os() {
        let err: Error = std::io::Error::from_raw_os_error(libc::ECONNREFUSED).into();
        match err {
            Error::Os(os) => assert_eq!(os.condition(), Condition::ConnectionRefused),
            other => panic!("expected Os error, got {:?}", other),
        }
    }
}
