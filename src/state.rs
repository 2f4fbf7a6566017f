use crate::error::Result;
use std::fmt;
use std::fs;
use std::path::Path;

/// The lock mode a client is requesting or holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    const fn as_char(self) -> char {
        match self {
            Self::Read => 'R',
            Self::Write => 'W',
        }
    }

    #[allow(clippy::panic)] // parse() only ever feeds characters this crate itself wrote
    fn from_char(c: char) -> Self {
        match c {
            'R' => Self::Read,
            'W' => Self::Write,
            other => panic!("state file corrupt: unrecognized mode character '{other}'"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Whether a client's requested mode has been granted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Granted,
    Pending,
}

impl Status {
    const fn as_char(self) -> char {
        match self {
            Self::Granted => 'G',
            Self::Pending => 'P',
        }
    }

    #[allow(clippy::panic)] // parse() only ever feeds characters this crate itself wrote
    fn from_char(c: char) -> Self {
        match c {
            'G' => Self::Granted,
            'P' => Self::Pending,
            other => panic!("state file corrupt: unrecognized status character '{other}'"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One outstanding request recorded in the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub host: String,
    pub pid: String,
    pub mode: Mode,
    pub status: Status,
    pub time: i64,
}

impl ClientState {
    #[must_use]
    pub fn matches(&self, host: &str, pid: &str) -> bool {
        self.host == host && self.pid == pid
    }
}

/// The parsed contents of the `state` file, plus whether it needs to be
/// rewritten.
#[derive(Debug, Clone, Default)]
pub struct StateFile {
    pub entries: Vec<ClientState>,
    dirty: bool,
}

impl StateFile {
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// A state with no granted entries has `granted_mode() == None`.
    /// Otherwise returns the mode shared by every granted entry (the
    /// invariant that all granted entries share a mode is maintained by the
    /// request engine, not re-checked here).
    #[must_use]
    pub fn granted_mode(&self) -> Option<Mode> {
        self.entries
            .iter()
            .find(|entry| entry.status == Status::Granted)
            .map(|entry| entry.mode)
    }

    #[must_use]
    pub fn find(&self, host: &str, pid: &str) -> Option<&ClientState> {
        self.entries.iter().find(|e| e.matches(host, pid))
    }

    pub fn find_mut(&mut self, host: &str, pid: &str) -> Option<&mut ClientState> {
        self.entries.iter_mut().find(|e| e.matches(host, pid))
    }

    /// Load `{lockdir}/state`. A missing file is treated as an empty state,
    /// not an error. Stale entries (`time < now - timeout_sec`) are dropped
    /// and the result is marked dirty so the caller rewrites the file.
    pub fn load(lockdir: &Path, now: i64, timeout_sec: i64) -> Result<Self> {
        let path = state_path(lockdir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(crate::error::NarwhalError::io_error(
                    format!("failed to read state file {}", path.display()),
                    err,
                ));
            }
        };
        Ok(Self::parse(&text, now, timeout_sec))
    }

    /// Parse the state file's text. Trusts that the text was produced by
    /// [`Self::serialize`]: a field count not divisible by 5, or an
    /// out-of-alphabet mode/status character, is a programmer error and
    /// panics rather than returning a recoverable error.
    #[must_use]
    #[allow(clippy::panic)] // only ever fed text this crate itself wrote via serialize()
    pub fn parse(text: &str, now: i64, timeout_sec: i64) -> Self {
        let first_fresh = now.saturating_sub(timeout_sec);
        let tokens: Vec<&str> = text.split_whitespace().collect();
        assert!(
            tokens.len() % 5 == 0,
            "state file corrupt: {} tokens is not a multiple of 5",
            tokens.len()
        );

        let mut entries = Vec::with_capacity(tokens.len() / 5);
        let mut dirty = false;

        for chunk in tokens.chunks_exact(5) {
            let [host, pid, mode, status, time] = chunk else {
                unreachable!("chunks_exact(5) always yields 5 elements")
            };
            let mode_char = single_char(mode);
            let status_char = single_char(status);
            let time: i64 = time
                .parse()
                .unwrap_or_else(|_| panic!("state file corrupt: '{time}' is not a valid timestamp"));

            if time >= first_fresh {
                entries.push(ClientState {
                    host: (*host).to_string(),
                    pid: (*pid).to_string(),
                    mode: Mode::from_char(mode_char),
                    status: Status::from_char(status_char),
                    time,
                });
            } else {
                dirty = true;
            }
        }

        Self { entries, dirty }
    }

    /// Serialize entries in their current order, one line each, a single
    /// space between fields and `\n` terminating each line.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.host);
            out.push(' ');
            out.push_str(&entry.pid);
            out.push(' ');
            out.push(entry.mode.as_char());
            out.push(' ');
            out.push(entry.status.as_char());
            out.push(' ');
            out.push_str(&entry.time.to_string());
            out.push('\n');
        }
        out
    }

    /// Overwrite `{lockdir}/state` with the current entries and clear the
    /// dirty flag. Must only be called while the filesystem mutex is held.
    pub fn persist(&mut self, lockdir: &Path) -> Result<()> {
        let path = state_path(lockdir);
        fs::write(&path, self.serialize()).map_err(|err| {
            crate::error::NarwhalError::io_error(
                format!("failed to write state file {}", path.display()),
                err,
            )
        })?;
        self.dirty = false;
        Ok(())
    }
}

#[allow(clippy::panic)] // only ever fed text this crate itself wrote via serialize()
fn single_char(token: &str) -> char {
    let mut chars = token.chars();
    let c = chars
        .next()
        .unwrap_or_else(|| panic!("state file corrupt: empty field where a single character was expected"));
    assert!(
        chars.next().is_none(),
        "state file corrupt: '{token}' is not a single character"
    );
    c
}

fn state_path(lockdir: &Path) -> std::path::PathBuf {
    lockdir.join("state")
}
