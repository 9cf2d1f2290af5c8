//! This module provides ways to tweak mocked transports, so that they can return errors on some tests

use crate::error::{BoxError, SyncError};

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,
    /// If this is true, failures are reported as rejected credentials rather than network errors
    pub fail_as_unauthorized: bool,

    pub fetch_all_entries_behaviour: (u32, u32),
    pub create_entry_behaviour: (u32, u32),
    pub update_entry_behaviour: (u32, u32),
    pub fetch_entry_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All actions will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            fail_as_unauthorized: false,
            fetch_all_entries_behaviour: (0, n_fails),
            create_entry_behaviour: (0, n_fails),
            update_entry_behaviour: (0, n_fails),
            fetch_entry_behaviour: (0, n_fails),
        }
    }

    /// Every request is rejected, as if the credentials were wrong
    pub fn unauthorized() -> Self {
        Self {
            fail_as_unauthorized: true,
            ..Self::fail_now(u32::MAX)
        }
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_fetch_all_entries(&mut self) -> Result<(), BoxError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.fetch_all_entries_behaviour, "fetch_all_entries", self.fail_as_unauthorized)
    }
    pub fn can_create_entry(&mut self) -> Result<(), BoxError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_entry_behaviour, "create_entry", self.fail_as_unauthorized)
    }
    pub fn can_update_entry(&mut self) -> Result<(), BoxError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.update_entry_behaviour, "update_entry", self.fail_as_unauthorized)
    }
    pub fn can_fetch_entry(&mut self) -> Result<(), BoxError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.fetch_entry_behaviour, "fetch_entry", self.fail_as_unauthorized)
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str, unauthorized: bool) -> Result<(), BoxError> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 = value.0 - 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else {
        if remaining_failures > 0 {
            value.1 = value.1 - 1;
            log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
            let reason = format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value);
            match unauthorized {
                true => Err(SyncError::Unauthorized(reason).into()),
                false => Err(SyncError::Transport(reason).into()),
            }
        } else {
            log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
            Ok(())
        }
    }
}
