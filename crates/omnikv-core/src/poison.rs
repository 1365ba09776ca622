//! Fatal-error latch for engine handles.
//!
//! I/O and corruption errors poison the handle: every subsequent call
//! returns the recorded error until the handle is closed. The latch keeps
//! the first fatal error; later failures do not overwrite it.

use parking_lot::RwLock;

use omnikv_error::{Result, StoreError, replay};

/// Sticky fatal-error state, embedded in every engine handle.
#[derive(Debug, Default)]
pub struct Poison {
    slot: RwLock<Option<StoreError>>,
}

impl Poison {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fast if the handle is already poisoned.
    ///
    /// # Errors
    ///
    /// Replays the recorded fatal error.
    pub fn check(&self) -> Result<()> {
        match &*self.slot.read() {
            None => Ok(()),
            Some(recorded) => Err(replay(recorded)),
        }
    }

    /// Record `error` if it is fatal and nothing is recorded yet.
    pub fn arm_if_fatal(&self, error: &StoreError) {
        if !error.is_fatal() {
            return;
        }
        let mut slot = self.slot.write();
        if slot.is_none() {
            tracing::error!(error = %error, "engine handle poisoned");
            *slot = Some(replay(error));
        }
    }

    /// Pass a result through, arming the latch on fatal errors.
    pub fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            self.arm_if_fatal(error);
        }
        result
    }
}
