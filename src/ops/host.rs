//! Host session around a batch.
//!
//! The host that owns the module files (an editor, a build server) must not
//! reload them while they are being rewritten. A [`HostSession`] is acquired
//! before the batch and released after it, on every path out including a
//! panic inside the batch.

use std::any::Any;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Exclusive access to the module files for the duration of a batch.
pub trait HostSession {
    /// Stop the host from touching the modules.
    fn acquire(&mut self) -> Result<()>;

    /// Hand the modules back to the host.
    fn release(&mut self);
}

/// Releases the session when dropped.
pub struct SessionGuard<'a> {
    host: &'a mut dyn HostSession,
}

impl<'a> SessionGuard<'a> {
    pub fn acquire(host: &'a mut dyn HostSession) -> Result<Self> {
        host.acquire()?;
        Ok(SessionGuard { host })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.host.release();
    }
}

/// A session for hosts that need no coordination.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSession;

impl HostSession for NoopSession {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {}
}

/// Name of the lock file [`LockFileSession`] creates in the project root.
pub const LOCK_FILE: &str = ".ilweave.lock";

/// A session held as a lock file in the project root.
///
/// Acquiring fails while another process holds the lock.
#[derive(Debug)]
pub struct LockFileSession {
    path: PathBuf,
    held: bool,
}

impl LockFileSession {
    pub fn new(root: &Path) -> Self {
        LockFileSession {
            path: root.join(LOCK_FILE),
            held: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HostSession for LockFileSession {
    fn acquire(&mut self) -> Result<()> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                anyhow::bail!(
                    "another ilweave process holds {}; delete it if no weave is running",
                    self.path.display()
                );
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to create lock file {}", self.path.display()))
            }
        };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("failed to write lock file {}", self.path.display()))?;

        self.held = true;
        tracing::debug!("acquired {}", self.path.display());
        Ok(())
    }

    fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to remove lock file {}: {}", self.path.display(), e);
        } else {
            tracing::debug!("released {}", self.path.display());
        }
    }
}

/// Run `f` inside a host session.
///
/// The session is released however `f` ends. A panic in `f` is logged as a
/// warning and yields `Ok(None)`, so the host is always handed back.
pub fn run_session<T>(host: &mut dyn HostSession, f: impl FnOnce() -> T) -> Result<Option<T>> {
    let _guard = SessionGuard::acquire(host)?;

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(Some(value)),
        Err(payload) => {
            tracing::warn!("weaving aborted: {}", panic_message(payload.as_ref()));
            Ok(None)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
