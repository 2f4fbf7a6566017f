use crate::error::{NarwhalError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The three tunables shared by every `NarwhalLock` operation.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Path to a directory on a filesystem whose `link(2)` is atomic across
    /// clients.
    pub lockdir: PathBuf,
    /// Microseconds to sleep between mutex-acquisition attempts.
    pub spin_usec: u64,
    /// Upper bound on mutex-acquisition spin, and staleness horizon for
    /// state entries, in seconds.
    pub timeout_sec: i64,
}

impl LockConfig {
    #[must_use]
    pub fn new(lockdir: impl Into<PathBuf>, spin_usec: u64, timeout_sec: i64) -> Self {
        Self {
            lockdir: lockdir.into(),
            spin_usec,
            timeout_sec,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_sec < 0 {
            return Err(NarwhalError::config_error(format!(
                "timeout_sec must be >= 0, got {}",
                self.timeout_sec
            )));
        }
        Ok(())
    }
}

/// Optional JSON defaults file for [`LockConfig`], so a deployment can ship
/// one `narwhal.json` next to the lockdir instead of hard-coding tunables in
/// every caller. Never consulted by the lock protocol itself.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigDefaults {
    pub lockdir: Option<PathBuf>,
    pub spin_usec: Option<u64>,
    pub timeout_sec: Option<i64>,
}

impl ConfigDefaults {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NarwhalError::config_error(format!(
                "config defaults file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            NarwhalError::io_error(format!("failed to read config file: {}", path.display()), e)
        })?;

        let defaults: Self = serde_json::from_str(&content).map_err(|e| {
            NarwhalError::json_error(format!("failed to parse config file: {}", path.display()), e)
        })?;

        defaults.validate()?;
        Ok(defaults)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(timeout_sec) = self.timeout_sec
            && timeout_sec < 0
        {
            return Err(NarwhalError::config_error(format!(
                "timeout_sec must be >= 0, got {timeout_sec}"
            )));
        }
        Ok(())
    }

    /// Build a [`LockConfig`], falling back to the given defaults for any
    /// field this file did not specify.
    #[must_use]
    pub fn into_config(self, fallback_spin_usec: u64, fallback_timeout_sec: i64) -> Option<LockConfig> {
        let lockdir = self.lockdir?;
        Some(LockConfig {
            lockdir,
            spin_usec: self.spin_usec.unwrap_or(fallback_spin_usec),
            timeout_sec: self.timeout_sec.unwrap_or(fallback_timeout_sec),
        })
    }
}
