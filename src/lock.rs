use crate::config::LockConfig;
use crate::engine;
use crate::error::Result;
use crate::identity::Identity;
use crate::mutex::FsMutex;
use crate::state::{Mode, StateFile};
use std::cell::Cell;
use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// A multiple-reader / single-writer advisory lock coordinated through a
/// shared directory on a networked filesystem.
///
/// `NarwhalLock` is intentionally `!Sync`: the protocol it implements is
/// only safe to drive from one thread per process. The marker field below
/// has no runtime behavior; it exists purely so the compiler rejects
/// `Arc<NarwhalLock>`-style sharing between threads without the caller
/// adding its own synchronization.
#[derive(Debug)]
pub struct NarwhalLock {
    identity: Identity,
    config: LockConfig,
    _not_sync: PhantomData<Cell<()>>,
}

impl NarwhalLock {
    /// Build a lock handle whose identity is populated from the operating
    /// system (hostname + pid).
    pub fn new(config: LockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            identity: Identity::from_os()?,
            config,
            _not_sync: PhantomData,
        })
    }

    /// Build a lock handle with an explicit identity override, e.g. for
    /// tests that simulate several remote clients in one process.
    pub fn with_identity(config: LockConfig, host: &str, pid: &str) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            identity: Identity::with_overrides(host, pid)?,
            config,
            _not_sync: PhantomData,
        })
    }

    /// Replace the host identifier used for subsequent operations.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        self.identity.set_host(host)
    }

    /// Replace the pid identifier used for subsequent operations.
    pub fn set_pid(&mut self, pid: &str) -> Result<()> {
        self.identity.set_pid(pid)
    }

    #[must_use]
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Block until a read lock is granted.
    #[instrument(skip(self), fields(lockdir = %self.config.lockdir.display()))]
    pub fn acquire_read(&self) -> Result<()> {
        self.acquire(Mode::Read)
    }

    /// Block until a write lock is granted.
    #[instrument(skip(self), fields(lockdir = %self.config.lockdir.display()))]
    pub fn acquire_write(&self) -> Result<()> {
        self.acquire(Mode::Write)
    }

    /// Release whichever lock this process currently holds.
    #[instrument(skip(self), fields(lockdir = %self.config.lockdir.display()))]
    pub fn release(&self) -> Result<()> {
        let mutex = FsMutex::acquire(
            &self.config.lockdir,
            &self.identity,
            self.config.timeout_sec,
            self.config.spin_usec,
        )?;

        let outcome = self.load_state().and_then(|mut state| {
            engine::release(&mut state, &self.identity)?;
            if state.is_dirty() {
                state.persist(&self.config.lockdir)?;
            }
            Ok(())
        });

        mutex.release(outcome.err())
    }

    fn acquire(&self, mode: Mode) -> Result<()> {
        loop {
            let mutex = FsMutex::acquire(
                &self.config.lockdir,
                &self.identity,
                self.config.timeout_sec,
                self.config.spin_usec,
            )?;

            let outcome = self.load_state().and_then(|mut state| {
                let now = current_time();
                let granted = engine::acquire(&mut state, &self.identity, mode, now)?;
                if state.is_dirty() {
                    state.persist(&self.config.lockdir)?;
                }
                Ok(granted)
            });

            match outcome {
                Ok(granted) => {
                    mutex.release(None)?;
                    if granted {
                        debug!(?mode, "lock granted");
                        return Ok(());
                    }
                    debug!(?mode, "request pending, spinning");
                }
                Err(err) => {
                    mutex.release(Some(err))?;
                }
            }
        }
    }

    fn load_state(&self) -> Result<StateFile> {
        let now = current_time();
        StateFile::load(&self.config.lockdir, now, self.config.timeout_sec)
    }
}

fn current_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
