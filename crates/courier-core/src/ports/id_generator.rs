//! IdGenerator port - ID 生成の抽象化
//!
//! IdGenerator は分散システムで使える ID を生成するためのインターフェースです。
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{CursorId, DestinationId, LockId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_cursor_id(&self) -> CursorId;

    fn generate_destination_id(&self) -> DestinationId;

    /// publish / delete の呼び出しごとに 1 つ
    fn generate_lock_id(&self) -> LockId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って決定的な ID を生成できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_cursor_id(&self) -> CursorId {
        CursorId::from(self.next_ulid())
    }

    fn generate_destination_id(&self) -> DestinationId {
        DestinationId::from(self.next_ulid())
    }

    fn generate_lock_id(&self) -> LockId {
        LockId::from(self.next_ulid())
    }
}
