//! Task lock helpers: bounded obtain / release and lease renewal.
//!
//! Publish, initiate and delete all hold the lock named after the cursor id, so
//! a deletion can never interleave with an in-flight delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use crate::domain::{CursorId, DatastoreError, LockId};
use crate::ports::{Clock, IdGenerator, TaskLock};

/// A lock this process currently holds.
#[derive(Debug)]
pub struct HeldLock {
    holder: LockId,
    resource: String,
    renewed_at: DateTime<Utc>,
}

impl HeldLock {
    pub fn holder(&self) -> LockId {
        self.holder
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub acquire: RetryPolicy,
    pub release: RetryPolicy,
    /// Renew once this much of the lease has elapsed.
    pub renew_after: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            acquire: RetryPolicy::lock_acquire(),
            release: RetryPolicy::lock_release(),
            renew_after: Duration::from_secs(20),
        }
    }
}

pub struct LockManager {
    locks: Arc<dyn TaskLock>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    settings: LockSettings,
}

impl LockManager {
    pub fn new(
        locks: Arc<dyn TaskLock>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        settings: LockSettings,
    ) -> Self {
        Self {
            locks,
            ids,
            clock,
            settings,
        }
    }

    pub fn resource_for(cursor_id: CursorId) -> String {
        cursor_id.to_string()
    }

    /// Try to take the lock for `cursor_id`, waiting between tries per the acquire policy.
    ///
    /// `Ok(None)` means another holder kept it for the whole window.
    pub async fn obtain(&self, cursor_id: CursorId) -> Result<Option<HeldLock>, DatastoreError> {
        let holder = self.ids.generate_lock_id();
        let resource = Self::resource_for(cursor_id);
        let policy = &self.settings.acquire;
        let attempts = policy.attempts();

        for attempt in 1..=attempts {
            match self.locks.obtain(holder, &resource).await {
                Ok(true) => {
                    debug!(%resource, %holder, attempt, "task lock obtained");
                    return Ok(Some(HeldLock {
                        holder,
                        resource,
                        renewed_at: self.clock.now(),
                    }));
                }
                Ok(false) => {
                    debug!(%resource, attempt, "task lock busy");
                }
                Err(e) if attempt == attempts => return Err(e),
                Err(e) => {
                    warn!(%resource, attempt, error = %e, "task lock obtain failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(policy.next_delay(attempt)).await;
            }
        }
        Ok(None)
    }

    /// Renew the lease once `renew_after` has elapsed since the last renewal.
    ///
    /// Returns `Ok(false)` when the lease was lost and the caller must stop.
    pub async fn renew_if_due(&self, lock: &mut HeldLock) -> Result<bool, DatastoreError> {
        let now = self.clock.now();
        let elapsed = (now - lock.renewed_at).to_std().unwrap_or_default();
        if elapsed < self.settings.renew_after {
            return Ok(true);
        }
        let renewed = self.locks.renew(lock.holder, &lock.resource).await?;
        if renewed {
            lock.renewed_at = now;
            debug!(resource = %lock.resource, "task lock renewed");
        } else {
            warn!(resource = %lock.resource, holder = %lock.holder, "task lock lost before renewal");
        }
        Ok(renewed)
    }

    /// Release with bounded retries. Never fails; returns whether the release took.
    pub async fn release(&self, lock: HeldLock) -> bool {
        let policy = &self.settings.release;
        let attempts = policy.attempts();

        for attempt in 1..=attempts {
            match self.locks.release(lock.holder, &lock.resource).await {
                Ok(true) => {
                    debug!(resource = %lock.resource, attempt, "task lock released");
                    return true;
                }
                Ok(false) => {
                    debug!(resource = %lock.resource, attempt, "task lock release refused");
                }
                Err(e) => {
                    warn!(resource = %lock.resource, attempt, error = %e, "task lock release failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(policy.next_delay(attempt)).await;
            }
        }
        warn!(resource = %lock.resource, holder = %lock.holder, attempts, "giving up on task lock release");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryTaskLock;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn setup() -> (Arc<FixedClock>, Arc<InMemoryTaskLock>, LockManager) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let locks = Arc::new(InMemoryTaskLock::new(
            chrono::Duration::seconds(60),
            clock.clone(),
        ));
        let settings = LockSettings {
            acquire: RetryPolicy::fixed(2, Duration::from_millis(1)),
            release: RetryPolicy::fixed(3, Duration::from_millis(1)),
            renew_after: Duration::from_secs(20),
        };
        let manager = LockManager::new(
            locks.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
            settings,
        );
        (clock, locks, manager)
    }

    #[tokio::test]
    async fn obtain_and_release() {
        let (_clock, locks, manager) = setup();
        let cursor = CursorId::from_ulid(Ulid::new());

        let held = manager.obtain(cursor).await.unwrap().unwrap();
        assert_eq!(locks.holder(held.resource()).await, Some(held.holder()));

        assert!(manager.release(held).await);
        assert_eq!(locks.holder(&cursor.to_string()).await, None);
    }

    #[tokio::test]
    async fn obtain_gives_up_when_lock_is_held() {
        let (_clock, locks, manager) = setup();
        let cursor = CursorId::from_ulid(Ulid::new());
        let other = LockId::from_ulid(Ulid::new());
        assert!(locks.obtain(other, &cursor.to_string()).await.unwrap());

        assert!(manager.obtain(cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewal_waits_for_threshold() {
        let (clock, locks, manager) = setup();
        let cursor = CursorId::from_ulid(Ulid::new());
        let mut held = manager.obtain(cursor).await.unwrap().unwrap();

        clock.advance(chrono::Duration::seconds(10));
        assert!(manager.renew_if_due(&mut held).await.unwrap());

        clock.advance(chrono::Duration::seconds(40));
        assert!(manager.renew_if_due(&mut held).await.unwrap());

        // still held 50s after the renewal at t=50s
        clock.advance(chrono::Duration::seconds(50));
        let intruder = LockId::from_ulid(Ulid::new());
        assert!(!locks.obtain(intruder, held.resource()).await.unwrap());
    }

    #[tokio::test]
    async fn lost_lease_is_reported() {
        let (clock, locks, manager) = setup();
        let cursor = CursorId::from_ulid(Ulid::new());
        let mut held = manager.obtain(cursor).await.unwrap().unwrap();

        clock.advance(chrono::Duration::seconds(61));
        let intruder = LockId::from_ulid(Ulid::new());
        assert!(locks.obtain(intruder, held.resource()).await.unwrap());

        assert!(!manager.renew_if_due(&mut held).await.unwrap());
        assert!(!manager.release(held).await);
    }
}
