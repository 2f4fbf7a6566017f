#![allow(unsafe_code)]

use crate::error::{NarwhalError, Result};

/// Bound on the buffer passed to `gethostname(2)`, matching the historical
/// Narwhal implementation this crate's protocol is ported from.
const HOST_NAME_BUFFER_LEN: usize = 1024;

/// The two strings that identify the calling process to its peers: its host
/// and its pid. Owned by the `NarwhalLock` that uses it rather than kept as
/// a process-wide mutable global, so two `NarwhalLock` values in the same
/// process (e.g. coordinating two different `lockdir`s) can carry distinct
/// identities if the caller ever needs that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    host: String,
    pid: String,
}

impl Identity {
    /// Populate host from the operating system's host-name query and pid
    /// from the current process id.
    pub fn from_os() -> Result<Self> {
        let mut identity = Self {
            host: query_hostname()?,
            pid: std::process::id().to_string(),
        };
        identity.host = sanitize_host(&identity.host);
        Ok(identity)
    }

    /// Build an identity from explicit overrides, skipping the OS queries
    /// entirely. Useful for tests, where a fake host/pid pair stands in for
    /// a would-be remote client.
    pub fn with_overrides(host: &str, pid: &str) -> Result<Self> {
        let mut identity = Self {
            host: String::new(),
            pid: String::new(),
        };
        identity.set_host(host)?;
        identity.set_pid(pid)?;
        Ok(identity)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Replace the host identifier. Input must be non-empty. Spaces are
    /// rewritten to underscores before storage so the state file remains
    /// whitespace-delimitable.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        if host.is_empty() {
            return Err(NarwhalError::config_error("host override must be non-empty"));
        }
        self.host = sanitize_host(host);
        Ok(())
    }

    /// Replace the pid identifier. Input must be non-empty.
    pub fn set_pid(&mut self, pid: &str) -> Result<()> {
        if pid.is_empty() {
            return Err(NarwhalError::config_error("pid override must be non-empty"));
        }
        self.pid = pid.to_string();
        Ok(())
    }

    #[must_use]
    pub fn matches(&self, host: &str, pid: &str) -> bool {
        self.host == host && self.pid == pid
    }

    /// The `{host}.{pid}` stem used for the per-process private file.
    #[must_use]
    pub fn private_file_name(&self) -> String {
        format!("{}.{}", self.host, self.pid)
    }
}

fn sanitize_host(host: &str) -> String {
    host.replace(' ', "_")
}

#[cfg(not(test))]
fn query_hostname() -> Result<String> {
    let mut buf = vec![0u8; HOST_NAME_BUFFER_LEN];
    // SAFETY: `buf` is a valid, appropriately-sized buffer for the duration
    // of the call, and we null-terminate defensively below before reading it
    // back as a C string.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(NarwhalError::io_error(
            "gethostname(2) failed",
            std::io::Error::last_os_error(),
        ));
    }
    let last = buf.len() - 1;
    buf[last] = 0;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..nul]).into_owned())
}

#[cfg(test)]
fn query_hostname() -> Result<String> {
    Ok("test-host".to_string())
}
