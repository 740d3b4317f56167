//! Cached model credential with an early-clear deadline and a bounded wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;

use crate::lock_unpoisoned;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("No credential provided")]
    Empty,

    #[error("Authentication timed out. Please sign in again and retry.")]
    TimedOut { waited: Duration },

    #[error("credential wait interrupted by cancellation")]
    Aborted,
}

#[derive(Debug, Default)]
struct CachedCredential {
    token: Option<String>,
    clear_at: Option<Instant>,
}

impl CachedCredential {
    fn valid_token(&mut self, now: Instant) -> Option<String> {
        if self.clear_at.is_some_and(|clear_at| now >= clear_at) {
            tracing::info!("clearing cached credential near expiry");
            self.token = None;
            self.clear_at = None;
        }
        self.token.clone()
    }
}

/// Credential slot shared by the controller and the GUI.
#[derive(Debug)]
pub struct CredentialCache {
    pre_expiry: Duration,
    min_lifetime: Duration,
    slot: Mutex<CachedCredential>,
    changed: Condvar,
}

impl CredentialCache {
    #[must_use]
    pub fn new(pre_expiry: Duration, min_lifetime: Duration) -> Self {
        Self {
            pre_expiry,
            min_lifetime,
            slot: Mutex::new(CachedCredential::default()),
            changed: Condvar::new(),
        }
    }

    /// Stores a credential valid until `expires_at`. An empty token clears the
    /// cache and is reported as an error.
    pub fn set(&self, token: &str, expires_at: SystemTime) -> Result<(), CredentialError> {
        let mut slot = lock_unpoisoned(&self.slot);
        if token.trim().is_empty() {
            tracing::warn!("empty credential supplied, clearing cache");
            *slot = CachedCredential::default();
            return Err(CredentialError::Empty);
        }

        let remaining = expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        let delay = clear_delay(remaining, self.pre_expiry, self.min_lifetime);
        slot.token = Some(token.to_string());
        slot.clear_at = Some(Instant::now() + delay);
        tracing::info!(clear_in_ms = delay.as_millis() as u64, "credential cached");

        drop(slot);
        self.changed.notify_all();
        Ok(())
    }

    pub fn clear(&self) {
        *lock_unpoisoned(&self.slot) = CachedCredential::default();
    }

    /// The cached credential, unless its clear deadline has passed.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        lock_unpoisoned(&self.slot).valid_token(Instant::now())
    }

    /// Blocks until a credential is available, `timeout` elapses, or `abort`
    /// is raised and waiters are woken.
    pub fn wait_for(
        &self,
        timeout: Duration,
        abort: &AtomicBool,
    ) -> Result<String, CredentialError> {
        let deadline = Instant::now() + timeout;
        let mut slot = lock_unpoisoned(&self.slot);

        loop {
            if abort.load(Ordering::SeqCst) {
                return Err(CredentialError::Aborted);
            }
            let now = Instant::now();
            if let Some(token) = slot.valid_token(now) {
                return Ok(token);
            }
            if now >= deadline {
                return Err(CredentialError::TimedOut { waited: timeout });
            }

            slot = match self.changed.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Wakes blocked waiters so they re-check their abort flag.
    pub fn wake_waiters(&self) {
        let _slot = lock_unpoisoned(&self.slot);
        self.changed.notify_all();
    }
}

/// How long a credential with `remaining` validity stays cached.
///
/// Cleared `pre_expiry` before real expiry, but never sooner than
/// `min_lifetime` while the credential outlives that floor. A credential
/// already inside the buffer is kept until it really expires.
#[must_use]
pub fn clear_delay(remaining: Duration, pre_expiry: Duration, min_lifetime: Duration) -> Duration {
    match remaining.checked_sub(pre_expiry) {
        Some(delay) if delay >= min_lifetime => delay,
        _ if remaining > min_lifetime => min_lifetime,
        Some(delay) => delay,
        None => remaining,
    }
}
