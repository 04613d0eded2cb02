//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けします。
//! `CursorId` と `DestinationId` は同じ 128-bit 値ですが、型として混同できません。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 作成順に並ぶので、ダッシュボードの一覧がそのまま作成順になる
//! - **分散生成可能**: リクエスト処理スレッドごとに調整なしで生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / FromStr で使うプレフィックス（"fsc-", "dest-", "lock-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when parsing an id from its display form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {prefix} id: {value}")]
pub struct IdParseError {
    prefix: &'static str,
    value: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// Accepts both the prefixed display form (`fsc-01H...`) and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError {
                prefix: T::prefix(),
                value: s.to_string(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Cursor Record のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cursor {}

impl IdMarker for Cursor {
    fn prefix() -> &'static str {
        "fsc-"
    }
}

/// Destination (connector-specific config record) のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {}

impl IdMarker for Destination {
    fn prefix() -> &'static str {
        "dest-"
    }
}

/// Task lock holder のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lock {}

impl IdMarker for Lock {
    fn prefix() -> &'static str {
        "lock-"
    }
}

/// Identifier of a Cursor Record (one per form x destination).
pub type CursorId = Id<Cursor>;

/// Identifier of the connector-specific config record paired with a cursor.
pub type DestinationId = Id<Destination>;

/// Identifier of one lock holder (one per publish / delete invocation).
pub type LockId = Id<Lock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        let ulid = Ulid::new();
        let cursor = CursorId::from_ulid(ulid);
        let destination = DestinationId::from_ulid(ulid);
        let lock = LockId::from_ulid(ulid);

        assert!(cursor.to_string().starts_with("fsc-"));
        assert!(destination.to_string().starts_with("dest-"));
        assert!(lock.to_string().starts_with("lock-"));
        // let _: CursorId = destination; // <- does not compile
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = CursorId::from_ulid(Ulid::new());

        let prefixed: CursorId = id.to_string().parse().unwrap();
        let bare: CursorId = id.as_ulid().to_string().parse().unwrap();

        assert_eq!(prefixed, id);
        assert_eq!(bare, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "fsc-not-a-ulid".parse::<CursorId>().unwrap_err();
        assert!(err.to_string().contains("fsc-"));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<CursorId>(), size_of::<Ulid>());
        assert_eq!(size_of::<LockId>(), 16);
    }
}
