//! InMemoryTaskLock - 期限付きの名前付きロック（開発・テスト用）
//!
//! 期限は `Clock` で判定するので、テストでは FixedClock を進めて期限切れを再現できます。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{DatastoreError, LockId};
use crate::ports::{Clock, TaskLock};

#[derive(Debug, Clone, Copy)]
struct Lease {
    holder: LockId,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryTaskLock {
    leases: Mutex<HashMap<String, Lease>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskLock {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Current live holder of `resource`, if any.
    pub async fn holder(&self, resource: &str) -> Option<LockId> {
        let now = self.clock.now();
        let leases = self.leases.lock().await;
        leases
            .get(resource)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.holder)
    }
}

#[async_trait]
impl TaskLock for InMemoryTaskLock {
    async fn obtain(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().await;
        if let Some(lease) = leases.get(resource)
            && lease.holder != holder
            && lease.expires_at > now
        {
            return Ok(false);
        }
        leases.insert(
            resource.to_string(),
            Lease {
                holder,
                expires_at: now + self.ttl,
            },
        );
        Ok(true)
    }

    async fn renew(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().await;
        match leases.get_mut(resource) {
            Some(lease) if lease.holder == holder && lease.expires_at > now => {
                lease.expires_at = now + self.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError> {
        let mut leases = self.leases.lock().await;
        match leases.get(resource) {
            Some(lease) if lease.holder == holder => {
                leases.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn setup() -> (Arc<FixedClock>, InMemoryTaskLock) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let lock = InMemoryTaskLock::new(Duration::seconds(60), clock.clone());
        (clock, lock)
    }

    fn holder() -> LockId {
        LockId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn second_holder_is_excluded_until_release() {
        let (_clock, lock) = setup();
        let (a, b) = (holder(), holder());

        assert!(lock.obtain(a, "fsc-1").await.unwrap());
        assert!(!lock.obtain(b, "fsc-1").await.unwrap());
        assert!(lock.obtain(b, "fsc-2").await.unwrap());

        assert!(!lock.release(b, "fsc-1").await.unwrap());
        assert!(lock.release(a, "fsc-1").await.unwrap());
        assert!(lock.obtain(b, "fsc-1").await.unwrap());
    }

    #[tokio::test]
    async fn same_holder_may_reobtain() {
        let (_clock, lock) = setup();
        let a = holder();
        assert!(lock.obtain(a, "fsc-1").await.unwrap());
        assert!(lock.obtain(a, "fsc-1").await.unwrap());
        assert_eq!(lock.holder("fsc-1").await, Some(a));
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let (clock, lock) = setup();
        let (a, b) = (holder(), holder());
        assert!(lock.obtain(a, "fsc-1").await.unwrap());

        clock.advance(Duration::seconds(61));
        assert_eq!(lock.holder("fsc-1").await, None);
        assert!(!lock.renew(a, "fsc-1").await.unwrap());
        assert!(lock.obtain(b, "fsc-1").await.unwrap());
    }

    #[tokio::test]
    async fn renew_extends_the_lease() {
        let (clock, lock) = setup();
        let (a, b) = (holder(), holder());
        assert!(lock.obtain(a, "fsc-1").await.unwrap());

        clock.advance(Duration::seconds(45));
        assert!(lock.renew(a, "fsc-1").await.unwrap());
        clock.advance(Duration::seconds(45));

        assert!(!lock.obtain(b, "fsc-1").await.unwrap());
    }
}
