use crate::error::{NarwhalError, Result};
use crate::identity::Identity;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exclusive, all-clients ownership of `{lockdir}/state`, obtained by
/// hard-linking a per-process private file to the well-known name
/// `lockfile`. `link(2)` is the one cross-client atomic primitive POSIX
/// guarantees on networked filesystems, so this is the only synchronization
/// primitive the protocol needs.
#[derive(Debug)]
pub struct FsMutex {
    lockdir: PathBuf,
    private_path: PathBuf,
    lockfile_path: PathBuf,
    released: bool,
}

impl FsMutex {
    /// Create the private file, then spin hard-linking it to `lockfile`
    /// until it succeeds or `timeout_sec` elapses.
    pub fn acquire(lockdir: &Path, identity: &Identity, timeout_sec: i64, spin_usec: u64) -> Result<Self> {
        let private_path = lockdir.join(identity.private_file_name());
        let lockfile_path = lockdir.join("lockfile");

        File::create(&private_path).map_err(|err| {
            NarwhalError::io_error(
                format!("failed to create private lock file {}", private_path.display()),
                err,
            )
        })?;

        let deadline = Instant::now() + Duration::from_secs(timeout_sec.max(0) as u64);
        let spin_duration = Duration::from_micros(spin_usec);

        loop {
            match std::fs::hard_link(&private_path, &lockfile_path) {
                Ok(()) => {
                    debug!(lockdir = %lockdir.display(), "filesystem mutex acquired");
                    return Ok(Self {
                        lockdir: lockdir.to_path_buf(),
                        private_path,
                        lockfile_path,
                        released: false,
                    });
                }
                Err(_) => {
                    if Instant::now() > deadline {
                        // Best-effort cleanup of our own private file; the
                        // mutex was never held so there is no lockfile to
                        // unlink.
                        let _ = std::fs::remove_file(&private_path);
                        return Err(NarwhalError::timeout(lockdir.to_path_buf(), timeout_sec));
                    }
                    std::thread::sleep(spin_duration);
                }
            }
        }
    }

    /// Release the mutex: unlink `lockfile` first, then the private file.
    /// Both unlinks are attempted even if the first fails; the first
    /// failure (if any) is the error returned. An error already present on
    /// entry is not clobbered by a successful release.
    pub fn release(mut self, prior_error: Option<NarwhalError>) -> Result<()> {
        let result = self.do_release();
        self.released = true;
        match prior_error {
            Some(err) => Err(err),
            None => result,
        }
    }

    fn do_release(&mut self) -> Result<()> {
        let lockfile_result = std::fs::remove_file(&self.lockfile_path);
        let private_result = std::fs::remove_file(&self.private_path);

        if let Err(err) = lockfile_result {
            return Err(NarwhalError::io_error(
                format!("failed to unlink {}", self.lockfile_path.display()),
                err,
            ));
        }
        if let Err(err) = private_result {
            return Err(NarwhalError::io_error(
                format!("failed to unlink {}", self.private_path.display()),
                err,
            ));
        }
        Ok(())
    }
}

impl Drop for FsMutex {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            lockdir = %self.lockdir.display(),
            "filesystem mutex dropped without an explicit release; cleaning up best-effort"
        );
        let _ = std::fs::remove_file(&self.lockfile_path);
        let _ = std::fs::remove_file(&self.private_path);
    }
}
