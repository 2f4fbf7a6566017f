use crate::error::{NarwhalError, Result};
use crate::identity::Identity;
use crate::state::{ClientState, Mode, Status, StateFile};

/// Mutate `state` to reflect a request from `identity` for `mode`, deciding
/// whether it can be granted immediately. Returns `Ok(true)` if granted,
/// `Ok(false)` if the request is now recorded as pending, or
/// `Err(NarwhalError::Unsupported)` if the caller already holds an
/// incompatible request.
pub fn acquire(state: &mut StateFile, identity: &Identity, mode: Mode, now: i64) -> Result<bool> {
    // Writer preference: a new read request is held back if a writer is
    // already waiting, even though reads are otherwise compatible with an
    // existing read grant. Without this a steady stream of readers could
    // starve a pending writer indefinitely.
    let grant_now = match mode {
        Mode::Write => state.granted_mode().is_none(),
        Mode::Read => {
            state.granted_mode() != Some(Mode::Write)
                && !state
                    .entries
                    .iter()
                    .any(|e| e.status == Status::Pending && e.mode == Mode::Write)
        }
    };

    match state.find_mut(identity.host(), identity.pid()) {
        None => {
            state.entries.push(ClientState {
                host: identity.host().to_string(),
                pid: identity.pid().to_string(),
                mode,
                status: if grant_now {
                    Status::Granted
                } else {
                    Status::Pending
                },
                time: now,
            });
            state.mark_dirty();
        }
        Some(existing) => {
            if existing.status == Status::Granted || existing.mode != mode {
                return Err(NarwhalError::unsupported(
                    "this process already has an incompatible or granted request",
                ));
            }

            if grant_now {
                existing.status = Status::Granted;
                existing.time = now;
                state.mark_dirty();
            } else if existing.time != now {
                existing.time = now;
                state.mark_dirty();
            }
        }
    }

    Ok(grant_now)
}

/// Remove `identity`'s entry from `state`. Fails with
/// `NarwhalError::Unsupported` if the caller holds no entry at all. A caller
/// that holds an entry is expected to have it `Granted` (a `Pending` caller
/// releasing without ever having been granted is a programmer error).
pub fn release(state: &mut StateFile, identity: &Identity) -> Result<()> {
    let index = state
        .entries
        .iter()
        .position(|entry| entry.matches(identity.host(), identity.pid()))
        .ok_or_else(|| NarwhalError::unsupported("this process does not hold a request"))?;

    debug_assert!(
        state.entries[index].status == Status::Granted,
        "release() called on a request that was never granted"
    );

    state.entries.remove(index);
    state.mark_dirty();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn identity(host: &str, pid: &str) -> Identity {
        Identity::with_overrides(host, pid).expect("overrides")
    }

    #[test]
    fn test_acquire_grants_when_state_empty() {
        let mut state = StateFile::default();
        let granted = acquire(&mut state, &identity("host1", "100"), Mode::Read, 100).expect("acquire");
        assert!(granted);
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].status, Status::Granted);
    }

    #[test]
    fn test_acquire_write_blocks_on_existing_read_grant() {
        let mut state = StateFile::default();
        acquire(&mut state, &identity("host1", "100"), Mode::Read, 100).expect("acquire A read");

        let granted =
            acquire(&mut state, &identity("host1", "200"), Mode::Write, 100).expect("acquire B write");
        assert!(!granted);
        assert_eq!(state.find("host1", "200").expect("entry").status, Status::Pending);
    }

    #[test]
    fn test_acquire_read_blocks_on_pending_writer() {
        // A holds a read grant. B requests write (pending). C requests read and
        // must also be pending, even though reads are normally compatible with
        // an existing read grant, because a writer is already pending.
        let mut state = StateFile::default();
        acquire(&mut state, &identity("host1", "100"), Mode::Read, 100).expect("A read");
        acquire(&mut state, &identity("host1", "200"), Mode::Write, 100).expect("B write pending");

        let granted = acquire(&mut state, &identity("host1", "300"), Mode::Read, 100).expect("C read");
        assert!(!granted, "a pending writer holds back new readers");
        assert_eq!(state.find("host1", "300").expect("entry").status, Status::Pending);
    }

    #[test]
    fn test_acquire_read_after_read_both_granted() {
        let mut state = StateFile::default();
        acquire(&mut state, &identity("host1", "100"), Mode::Read, 100).expect("A");
        let granted = acquire(&mut state, &identity("host1", "200"), Mode::Read, 100).expect("B");
        assert!(granted);
        assert!(state.entries.iter().all(|e| e.status == Status::Granted));
    }

    #[test]
    fn test_acquire_double_acquire_same_mode_is_unsupported() {
        let mut state = StateFile::default();
        let id = identity("host1", "100");
        acquire(&mut state, &id, Mode::Read, 100).expect("first acquire");

        let result = acquire(&mut state, &id, Mode::Read, 100);
        assert!(matches!(result, Err(NarwhalError::Unsupported { .. })));
    }

    #[test]
    fn test_acquire_mode_change_is_unsupported() {
        let mut state = StateFile::default();
        let id = identity("host1", "100");
        // A acquires read, then (without releasing) asks for write.
        state.entries.push(ClientState {
            host: "host1".to_string(),
            pid: "100".to_string(),
            mode: Mode::Read,
            status: Status::Pending,
            time: 100,
        });

        let result = acquire(&mut state, &id, Mode::Write, 100);
        assert!(matches!(result, Err(NarwhalError::Unsupported { .. })));
    }

    #[test]
    fn test_acquire_grant_refreshes_time() {
        // Open question resolved: flipping Pending -> Granted also stamps the
        // current time in the same tick.
        let mut state = StateFile::default();
        state.entries.push(ClientState {
            host: "host1".to_string(),
            pid: "100".to_string(),
            mode: Mode::Write,
            status: Status::Pending,
            time: 50,
        });

        let granted = acquire(&mut state, &identity("host1", "100"), Mode::Write, 100).expect("acquire");
        assert!(granted);
        assert_eq!(state.find("host1", "100").expect("entry").time, 100);
    }

    #[test]
    fn test_acquire_pending_renewal_refreshes_time_without_granting() {
        let mut state = StateFile::default();
        // A writer is pending because a reader holds the grant.
        state.entries.push(ClientState {
            host: "host1".to_string(),
            pid: "100".to_string(),
            mode: Mode::Read,
            status: Status::Granted,
            time: 50,
        });
        state.entries.push(ClientState {
            host: "host1".to_string(),
            pid: "200".to_string(),
            mode: Mode::Write,
            status: Status::Pending,
            time: 50,
        });

        let granted = acquire(&mut state, &identity("host1", "200"), Mode::Write, 100).expect("spin");
        assert!(!granted);
        assert_eq!(state.find("host1", "200").expect("entry").time, 100);
    }

    #[test]
    fn test_release_removes_entry() {
        let mut state = StateFile::default();
        let id = identity("host1", "100");
        acquire(&mut state, &id, Mode::Read, 100).expect("acquire");

        release(&mut state, &id).expect("release");
        assert!(state.find("host1", "100").is_none());
    }

    #[test]
    fn test_release_without_entry_is_unsupported() {
        let mut state = StateFile::default();
        let result = release(&mut state, &identity("host1", "100"));
        assert!(matches!(result, Err(NarwhalError::Unsupported { .. })));
    }

    #[test]
    fn test_release_preserves_order_of_remaining_entries() {
        let mut state = StateFile::default();
        acquire(&mut state, &identity("host1", "100"), Mode::Read, 100).expect("A");
        acquire(&mut state, &identity("host1", "200"), Mode::Read, 100).expect("B");
        acquire(&mut state, &identity("host1", "300"), Mode::Read, 100).expect("C");

        release(&mut state, &identity("host1", "200")).expect("release B");

        let pids: Vec<&str> = state.entries.iter().map(|e| e.pid.as_str()).collect();
        assert_eq!(pids, vec!["100", "300"]);
    }
}
