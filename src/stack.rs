//! Process-wide network-stack bootstrap gate.
//!
//! Some platforms require a handshake with the socket layer before any
//! address or socket call (and a matching teardown after the last one);
//! on POSIX both are no-ops. A [`Session`] is held by every live socket
//! and for the duration of each name-resolution call, and an atomic
//! counter runs the platform hooks at the 0→1 and 1→0 edges.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

static LIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// RAII guard over the platform network stack.
///
/// Acquiring the first session runs the platform startup hook; dropping
/// the last runs the shutdown hook. Sessions may be acquired and dropped
/// from any thread.
#[derive(Debug)]
pub(crate) struct Session(());

impl Session {
    pub(crate) fn acquire() -> Result<Session> {
        if LIVE_SESSIONS.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Err(e) = platform_startup() {
                LIVE_SESSIONS.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
            log::trace!("network stack initialized");
        }
        Ok(Session(()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if LIVE_SESSIONS.fetch_sub(1, Ordering::AcqRel) == 1 {
            platform_shutdown();
            log::trace!("network stack deinitialized");
        }
    }
}

/// POSIX socket layers need no handshake. A WinSock-style port would
/// run its WSAStartup equivalent here and surface its failure code.
#[cfg(unix)]
fn platform_startup() -> Result<()> {
    Ok(())
}

/// Teardown must not fail; errors from the platform are discarded.
#[cfg(unix)]
fn platform_shutdown() {}
