//! Reentrancy guard.
//!
//! [`ReentrancyGuard::enter`] hands out a [`ReentrancyLock`] that clears the
//! flag when dropped, so every exit path (success, `?`, panic unwind)
//! releases it. A second `enter` while a lock is alive fails with
//! [`EscrowError::ReentrancyGuardReentrantCall`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EscrowError;

/// Non-reentrancy flag shared with the locks it hands out.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the guard.
    pub fn enter(&self) -> Result<ReentrancyLock, EscrowError> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EscrowError::ReentrancyGuardReentrantCall)?;
        Ok(ReentrancyLock {
            entered: Arc::clone(&self.entered),
        })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// A fresh, unlocked guard. Clones never share a flag with the original.
impl Clone for ReentrancyGuard {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Scoped acquisition of a [`ReentrancyGuard`].
#[must_use = "the guard is released as soon as the lock is dropped"]
#[derive(Debug)]
pub struct ReentrancyLock {
    entered: Arc<AtomicBool>,
}

impl Drop for ReentrancyLock {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::Release);
    }
}
