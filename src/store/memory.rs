//! In-memory store.
//!
//! Behaves like a read-committed SQL store with row-level exclusive locks:
//! - each row key has its own async mutex, held until commit or rollback
//! - locking an absent row locks nothing (same as `FOR UPDATE` finding no row)
//! - writes are staged per transaction and published atomically on commit
//! - an insert waits for a concurrent uncommitted insert of the same key, then
//!   fails with a unique violation only if that insert was committed
//!
//! Lock waits end in `LockTimeout`; there is no deadlock detector, so the
//! snapshot always reports zero deadlocks. Data is lost when the process exits.

use super::{
    LotterySnapshot, LotteryStore, LotteryTransaction, StoreError, StoreResult, Table, UserRow,
};
use crate::entities::GLOBAL_COUNTER;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    User(String),
    Activated(String),
    Counter(String),
}

impl RowKey {
    fn table(&self) -> Table {
        match self {
            RowKey::User(_) => Table::Users,
            RowKey::Activated(_) => Table::Activated,
            RowKey::Counter(_) => Table::Counters,
        }
    }

    fn key(&self) -> &str {
        match self {
            RowKey::User(k) | RowKey::Activated(k) | RowKey::Counter(k) => k,
        }
    }

    fn exists_in(&self, tables: &Tables) -> bool {
        match self {
            RowKey::User(k) => tables.users.contains_key(k),
            RowKey::Activated(k) => tables.activated.contains(k),
            RowKey::Counter(k) => tables.counters.contains_key(k),
        }
    }

    fn unique_violation(&self) -> StoreError {
        StoreError::UniqueViolation {
            table: self.table(),
            key: self.key().to_owned(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, i32>,
    activated: HashSet<String>,
    counters: HashMap<String, i64>,
}

/// Which lock table a guard belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKind {
    /// `FOR UPDATE` on an existing row
    Row,
    /// Pending insert of a key (the index entry of a unique key)
    Insert,
}

type LockId = (LockKind, RowKey);

#[derive(Default)]
struct Shared {
    committed: Mutex<Tables>,
    locks: Mutex<HashMap<LockId, Arc<RowLock<()>>>>,
}

impl Shared {
    fn committed(&self) -> MutexGuard<'_, Tables> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<LockId, Arc<RowLock<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for(&self, id: &LockId) -> Arc<RowLock<()>> {
        self.lock_table().entry(id.clone()).or_default().clone()
    }

    /// Drop the entry for `id` once nobody holds or waits on it.
    fn prune(&self, id: &LockId) {
        let mut locks = self.lock_table();
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Empty store: no users, no codes and no counter row.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            lock_timeout,
        }
    }

    /// Store with the global counter row pre-created at 0, matching a freshly
    /// migrated database.
    pub fn seeded(lock_timeout: Duration) -> Self {
        let store = Self::new(lock_timeout);
        store
            .shared
            .committed()
            .counters
            .insert(GLOBAL_COUNTER.to_owned(), 0);
        store
    }

    /// Committed win count of `name`, `None` if the user never won.
    pub fn user_wins(&self, name: &str) -> Option<i32> {
        self.shared.committed().users.get(name).copied()
    }

    pub fn is_activated(&self, code: &str) -> bool {
        self.shared.committed().activated.contains(code)
    }

    pub fn counter_value(&self) -> Option<i64> {
        self.shared.committed().counters.get(GLOBAL_COUNTER).copied()
    }

    /// Number of lock entries currently kept, held or not.
    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.shared.lock_table().len()
    }
}

#[async_trait]
impl LotteryStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn LotteryTransaction>> {
        Ok(Box::new(MemoryTransaction {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            writes: Tables::default(),
            finished: false,
        }))
    }

    async fn snapshot(&self) -> StoreResult<LotterySnapshot> {
        let tables = self.shared.committed();
        Ok(LotterySnapshot::from_wins(
            tables.counters.get(GLOBAL_COUNTER).copied().unwrap_or(0),
            tables.activated.len() as i64,
            tables.users.values().copied(),
        ))
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<LockId, OwnedMutexGuard<()>>,
    /// Own writes, published on commit
    writes: Tables,
    finished: bool,
}

impl MemoryTransaction {
    async fn acquire(&mut self, id: LockId) -> StoreResult<()> {
        if self.held.contains_key(&id) {
            return Ok(());
        }
        let lock = self.shared.lock_for(&id);
        let waited = tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await;
        let guard = match waited {
            Ok(guard) => guard,
            Err(_) => {
                self.shared.prune(&id);
                let key = &id.1;
                return Err(StoreError::LockTimeout(format!(
                    "{}/{}",
                    key.table(),
                    key.key()
                )));
            }
        };
        self.held.insert(id, guard);
        Ok(())
    }

    fn release(&mut self, id: &LockId) {
        if self.held.remove(id).is_some() {
            self.shared.prune(id);
        }
    }

    /// Lock `key` and keep the lock only if the row is committed.
    async fn lock_committed_row(&mut self, key: RowKey) -> StoreResult<bool> {
        let id = (LockKind::Row, key);
        self.acquire(id.clone()).await?;
        let exists = id.1.exists_in(&self.shared.committed());
        if !exists {
            self.release(&id);
        }
        Ok(exists)
    }

    /// Claim `key` for an insert. Waits while another transaction has the same
    /// key pending, then fails only if that insert got committed.
    async fn claim_insert(&mut self, key: RowKey) -> StoreResult<()> {
        if key.exists_in(&self.writes) {
            return Err(key.unique_violation());
        }
        let id = (LockKind::Insert, key);
        self.acquire(id.clone()).await?;
        if id.1.exists_in(&self.shared.committed()) {
            self.release(&id);
            return Err(id.1.unique_violation());
        }
        Ok(())
    }

    fn row_visible(&self, key: &RowKey) -> bool {
        key.exists_in(&self.writes) || key.exists_in(&self.shared.committed())
    }

    fn finish(&mut self, publish: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let writes = std::mem::take(&mut self.writes);
        if publish {
            let mut committed = self.shared.committed();
            committed.users.extend(writes.users);
            committed.activated.extend(writes.activated);
            committed.counters.extend(writes.counters);
        }
        // 先发布数据，再释放行锁
        let ids: Vec<LockId> = self.held.keys().cloned().collect();
        for id in &ids {
            self.release(id);
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[async_trait]
impl LotteryTransaction for MemoryTransaction {
    async fn lock_user(&mut self, name: &str) -> StoreResult<Option<UserRow>> {
        if let Some(&wins) = self.writes.users.get(name) {
            return Ok(Some(UserRow {
                name: name.to_owned(),
                wins,
            }));
        }
        if !self.lock_committed_row(RowKey::User(name.to_owned())).await? {
            return Ok(None);
        }
        let wins = self.shared.committed().users.get(name).copied();
        Ok(wins.map(|wins| UserRow {
            name: name.to_owned(),
            wins,
        }))
    }

    async fn code_exists(&mut self, code: &str) -> StoreResult<bool> {
        Ok(self.row_visible(&RowKey::Activated(code.to_owned())))
    }

    async fn lock_counter(&mut self, name: &str) -> StoreResult<Option<i64>> {
        if let Some(&value) = self.writes.counters.get(name) {
            return Ok(Some(value));
        }
        if !self.lock_committed_row(RowKey::Counter(name.to_owned())).await? {
            return Ok(None);
        }
        Ok(self.shared.committed().counters.get(name).copied())
    }

    async fn insert_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        self.claim_insert(RowKey::Counter(name.to_owned())).await?;
        self.writes.counters.insert(name.to_owned(), value);
        Ok(())
    }

    async fn update_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        if !self.row_visible(&RowKey::Counter(name.to_owned())) {
            return Err(StoreError::RowMissing {
                table: Table::Counters,
                key: name.to_owned(),
            });
        }
        self.writes.counters.insert(name.to_owned(), value);
        Ok(())
    }

    async fn insert_activated(&mut self, code: &str) -> StoreResult<()> {
        self.claim_insert(RowKey::Activated(code.to_owned())).await?;
        self.writes.activated.insert(code.to_owned());
        Ok(())
    }

    async fn insert_user(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        self.claim_insert(RowKey::User(name.to_owned())).await?;
        self.writes.users.insert(name.to_owned(), wins);
        Ok(())
    }

    async fn update_user_wins(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        if !self.row_visible(&RowKey::User(name.to_owned())) {
            return Err(StoreError::RowMissing {
                table: Table::Users,
                key: name.to_owned(),
            });
        }
        self.writes.users.insert(name.to_owned(), wins);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut txn = *self;
        txn.finish(true);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut txn = *self;
        txn.finish(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::seeded(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = store();
        let mut t1 = store.begin().await.unwrap();
        t1.insert_activated("AAAAA").await.unwrap();
        assert!(t1.code_exists("AAAAA").await.unwrap());

        let mut t2 = store.begin().await.unwrap();
        assert!(!t2.code_exists("AAAAA").await.unwrap());

        t1.commit().await.unwrap();
        // read committed: 同一事务内再次读取可见
        assert!(t2.code_exists("AAAAA").await.unwrap());
        assert!(store.is_activated("AAAAA"));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = store();
        let mut t1 = store.begin().await.unwrap();
        t1.lock_counter(GLOBAL_COUNTER).await.unwrap();
        t1.update_counter(GLOBAL_COUNTER, 7).await.unwrap();
        t1.insert_user("alice", 1).await.unwrap();
        t1.rollback().await.unwrap();

        assert_eq!(store.counter_value(), Some(0));
        assert_eq!(store.user_wins("alice"), None);
    }

    #[tokio::test]
    async fn test_counter_lock_blocks_until_commit() {
        let store = MemoryStore::seeded(Duration::from_secs(5));
        let mut t1 = store.begin().await.unwrap();
        assert_eq!(t1.lock_counter(GLOBAL_COUNTER).await.unwrap(), Some(0));

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut t2 = store.begin().await.unwrap();
                let seen = t2.lock_counter(GLOBAL_COUNTER).await.unwrap();
                t2.rollback().await.unwrap();
                seen
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        t1.update_counter(GLOBAL_COUNTER, 1).await.unwrap();
        t1.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let store = store();
        let mut t1 = store.begin().await.unwrap();
        t1.lock_counter(GLOBAL_COUNTER).await.unwrap();

        let mut t2 = store.begin().await.unwrap();
        let err = t2.lock_counter(GLOBAL_COUNTER).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(ref what) if what == "counters/a"));
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_locks() {
        let store = store();
        {
            let mut t1 = store.begin().await.unwrap();
            t1.lock_counter(GLOBAL_COUNTER).await.unwrap();
            t1.insert_activated("BBBBB").await.unwrap();
        }

        let mut t2 = store.begin().await.unwrap();
        assert_eq!(t2.lock_counter(GLOBAL_COUNTER).await.unwrap(), Some(0));
        t2.insert_activated("BBBBB").await.unwrap();
    }

    /// Starts a transaction that inserts `code` and reports how it ended.
    fn spawn_insert(
        store: &MemoryStore,
        code: &'static str,
    ) -> tokio::task::JoinHandle<StoreResult<()>> {
        let store = store.clone();
        tokio::spawn(async move {
            let mut txn = store.begin().await?;
            txn.insert_activated(code).await?;
            txn.commit().await
        })
    }

    #[tokio::test]
    async fn test_insert_waits_for_pending_insert_then_conflicts() {
        let store = MemoryStore::seeded(Duration::from_secs(5));
        let mut t1 = store.begin().await.unwrap();
        t1.insert_activated("CCCCC").await.unwrap();

        let waiter = spawn_insert(&store, "CCCCC");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        t1.commit().await.unwrap();
        assert!(waiter.await.unwrap().unwrap_err().is_duplicate_code());

        let mut t3 = store.begin().await.unwrap();
        assert!(t3.insert_activated("CCCCC").await.unwrap_err().is_duplicate_code());
    }

    #[tokio::test]
    async fn test_insert_succeeds_after_pending_insert_rolls_back() {
        let store = MemoryStore::seeded(Duration::from_secs(5));
        let mut t1 = store.begin().await.unwrap();
        t1.insert_activated("DDDDD").await.unwrap();

        let waiter = spawn_insert(&store, "DDDDD");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        t1.rollback().await.unwrap();
        waiter.await.unwrap().unwrap();
        assert!(store.is_activated("DDDDD"));
    }

    #[tokio::test]
    async fn test_pending_insert_wait_times_out() {
        let store = store();
        let mut t1 = store.begin().await.unwrap();
        t1.insert_user("alice", 1).await.unwrap();

        let mut t2 = store.begin().await.unwrap();
        let err = t2.insert_user("alice", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(ref what) if what == "users/alice"));
    }

    #[tokio::test]
    async fn test_insert_twice_in_one_transaction_conflicts() {
        let store = store();
        let mut txn = store.begin().await.unwrap();
        txn.insert_activated("EEEEE").await.unwrap();
        assert!(txn.insert_activated("EEEEE").await.unwrap_err().is_duplicate_code());
    }

    #[tokio::test]
    async fn test_released_lock_entries_are_pruned() {
        let store = store();
        for name in ["ann01", "ann02", "ann03"] {
            let mut txn = store.begin().await.unwrap();
            // 用户不存在，不保留锁
            assert_eq!(txn.lock_user(name).await.unwrap(), None);
            assert_eq!(store.lock_entries(), 0);
            txn.lock_counter(GLOBAL_COUNTER).await.unwrap();
            txn.insert_activated(name).await.unwrap();
            assert_eq!(store.lock_entries(), 2);
            txn.commit().await.unwrap();
        }
        assert_eq!(store.lock_entries(), 0);

        let mut held = store.begin().await.unwrap();
        held.lock_counter(GLOBAL_COUNTER).await.unwrap();
        let mut late = store.begin().await.unwrap();
        assert!(late.lock_counter(GLOBAL_COUNTER).await.is_err());
        drop(late);
        // 超时放弃等待后条目仍被持有者占用
        assert_eq!(store.lock_entries(), 1);
        drop(held);
        assert_eq!(store.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_absent_row_is_not_locked() {
        let store = store();
        let mut t1 = store.begin().await.unwrap();
        assert_eq!(t1.lock_user("ghost").await.unwrap(), None);

        let mut t2 = store.begin().await.unwrap();
        assert_eq!(t2.lock_user("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_fails() {
        let store = MemoryStore::new(Duration::from_millis(200));
        let mut txn = store.begin().await.unwrap();
        assert!(matches!(
            txn.update_counter(GLOBAL_COUNTER, 1).await,
            Err(StoreError::RowMissing { table: Table::Counters, .. })
        ));
        assert!(matches!(
            txn.update_user_wins("alice", 1).await,
            Err(StoreError::RowMissing { table: Table::Users, .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_reads_committed_totals() {
        let store = store();
        let mut txn = store.begin().await.unwrap();
        txn.update_counter(GLOBAL_COUNTER, 2).await.unwrap();
        txn.insert_activated("AAAAA").await.unwrap();
        txn.insert_activated("BBBBB").await.unwrap();
        txn.insert_user("alice", 2).await.unwrap();
        txn.commit().await.unwrap();

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.counter, 2);
        assert_eq!(snap.activated, 2);
        assert_eq!(snap.total_wins, 2);
        assert_eq!(snap.max_wins, 2);
        assert_eq!(snap.winners, 1);
    }
}
