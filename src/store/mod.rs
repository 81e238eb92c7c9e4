//! Transactional row store used by the redemption engine.
//!
//! The engine only ever talks to [`LotteryStore`] / [`LotteryTransaction`].
//! Implementations:
//! - [`SeaOrmStore`] - Postgres / MySQL via sea-orm (`SELECT ... FOR UPDATE`)
//! - [`MemoryStore`] - in-process store with per-row exclusive locks
//!
//! Every transaction runs at read-committed isolation. A transaction that is
//! dropped without `commit` is rolled back and releases all of its locks.

pub mod memory;
pub mod sea_orm_store;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sea_orm_store::SeaOrmStore;

/// Tables touched by a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Activated,
    Counters,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Table::Users => "users",
            Table::Activated => "activated",
            Table::Counters => "counters",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated on {table}: {key}")]
    UniqueViolation { table: Table, key: String },

    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    /// The database picked this transaction as a deadlock victim
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    #[error("Row missing from {table}: {key}")]
    RowMissing { table: Table, key: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl StoreError {
    /// True when another transaction already activated the same code.
    pub fn is_duplicate_code(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation {
                table: Table::Activated,
                ..
            }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 死锁计数，进程内累计，审计时读取
#[derive(Debug, Clone, Default)]
pub struct DeadlockCounter(Arc<AtomicU64>);

impl DeadlockCounter {
    /// Count `err` if it is a deadlock, then hand it back.
    pub fn record(&self, err: StoreError) -> StoreError {
        if matches!(err, StoreError::Deadlock(_)) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        err
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A locked `users` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub name: String,
    pub wins: i32,
}

/// Committed state, read outside of any redemption transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LotterySnapshot {
    /// Value of the global counter (0 if the row does not exist yet)
    pub counter: i64,
    /// Number of activated codes
    pub activated: i64,
    /// Sum of wins over all users
    pub total_wins: i64,
    /// Highest win count of any single user
    pub max_wins: i32,
    /// Number of users with a row (users who won at least once)
    pub winners: i64,
    /// Deadlocks reported by the database since the store was created
    pub deadlocks: u64,
}

impl LotterySnapshot {
    pub(crate) fn from_wins(counter: i64, activated: i64, wins: impl IntoIterator<Item = i32>) -> Self {
        let mut snapshot = LotterySnapshot {
            counter,
            activated,
            ..Default::default()
        };
        for w in wins {
            snapshot.total_wins += i64::from(w);
            snapshot.max_wins = snapshot.max_wins.max(w);
            snapshot.winners += 1;
        }
        snapshot
    }
}

#[async_trait]
pub trait LotteryStore: Send + Sync {
    /// Open a read-committed transaction with the configured lock timeout applied.
    async fn begin(&self) -> StoreResult<Box<dyn LotteryTransaction>>;

    /// Read the committed totals used by the consistency audit.
    async fn snapshot(&self) -> StoreResult<LotterySnapshot>;
}

/// One open transaction. Locks taken here are held until `commit` / `rollback`
/// (or until the transaction is dropped).
#[async_trait]
pub trait LotteryTransaction: Send {
    /// `SELECT ... FOR UPDATE` on the user row. An absent row locks nothing.
    async fn lock_user(&mut self, name: &str) -> StoreResult<Option<UserRow>>;

    /// Plain read without locks.
    async fn code_exists(&mut self, code: &str) -> StoreResult<bool>;

    /// `SELECT ... FOR UPDATE` on the counter row, returning its value.
    async fn lock_counter(&mut self, name: &str) -> StoreResult<Option<i64>>;

    async fn insert_counter(&mut self, name: &str, value: i64) -> StoreResult<()>;

    async fn update_counter(&mut self, name: &str, value: i64) -> StoreResult<()>;

    /// Fails with [`StoreError::UniqueViolation`] on [`Table::Activated`] when
    /// the code was already activated.
    async fn insert_activated(&mut self, code: &str) -> StoreResult<()>;

    async fn insert_user(&mut self, name: &str, wins: i32) -> StoreResult<()>;

    async fn update_user_wins(&mut self, name: &str, wins: i32) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
