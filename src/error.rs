use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error type for Narwhal lock operations
#[derive(Debug)]
pub enum NarwhalError {
    /// IO errors (file open/read/write/link/unlink)
    Io { context: String, source: io::Error },

    /// The filesystem mutex could not be acquired before `timeout_sec` elapsed
    Timeout { lockdir: PathBuf, timeout_sec: i64 },

    /// The calling process asked for an operation inconsistent with its
    /// existing entry: double-acquire, a mode change, or release without
    /// holding the lock.
    Unsupported { reason: String },

    /// Configuration errors (empty identity override, invalid defaults file).
    Config { message: String },

    /// JSON (de)serialization errors from a `ConfigDefaults` file.
    Json {
        context: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for NarwhalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { context, source } => {
                write!(f, "{context}: {source}")
            }
            Self::Timeout {
                lockdir,
                timeout_sec,
            } => {
                write!(
                    f,
                    "timed out after {}s waiting for the filesystem mutex in {}",
                    timeout_sec,
                    lockdir.display()
                )
            }
            Self::Unsupported { reason } => {
                write!(f, "unsupported request: {reason}")
            }
            Self::Config { message } => {
                write!(f, "configuration error: {message}")
            }
            Self::Json { context, source } => {
                write!(f, "JSON error in {context}: {source}")
            }
        }
    }
}

impl std::error::Error for NarwhalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for NarwhalError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "IO operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for NarwhalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            context: "JSON operation failed".to_string(),
            source: err,
        }
    }
}

// Helper methods for creating errors with context
impl NarwhalError {
    pub fn io_error(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub const fn timeout(lockdir: PathBuf, timeout_sec: i64) -> Self {
        Self::Timeout {
            lockdir,
            timeout_sec,
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn json_error(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for Narwhal operations
pub type Result<T> = std::result::Result<T, NarwhalError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = NarwhalError::config_error("host override must be non-empty");
        assert_eq!(
            err.to_string(),
            "configuration error: host override must be non-empty"
        );

        let err = NarwhalError::timeout(PathBuf::from("/tmp/lockdir"), 10);
        assert!(err.to_string().contains("timed out after 10s"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let narwhal_err = NarwhalError::from(io_err);

        assert!(matches!(narwhal_err, NarwhalError::Io { .. }));
        assert!(narwhal_err.to_string().contains("IO operation failed"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let narwhal_err = NarwhalError::io_error("cannot read state file", io_err);

        assert!(narwhal_err.source().is_some());
    }

    #[test]
    fn test_unsupported_helper() {
        let err = NarwhalError::unsupported("process already holds a granted lock");
        assert!(matches!(err, NarwhalError::Unsupported { .. }));
        assert!(err.to_string().contains("unsupported request"));
    }
}
