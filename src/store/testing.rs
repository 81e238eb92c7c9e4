//! Test doubles: a store wrapper that records every call and can inject a
//! failure into one chosen operation.

use super::{
    LotterySnapshot, LotteryStore, LotteryTransaction, MemoryStore, StoreError, StoreResult,
    UserRow,
};
use async_trait::async_trait;
use sea_orm::DbErr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<&'static str>>>,
    fail_on: Option<&'static str>,
}

impl Recorder {
    fn record(&self, op: &'static str) -> StoreResult<()> {
        self.log.lock().unwrap().push(op);
        if self.fail_on == Some(op) {
            return Err(StoreError::Database(DbErr::Custom(format!(
                "injected failure in {op}"
            ))));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecordingStore {
    inner: MemoryStore,
    recorder: Recorder,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            recorder: Recorder::default(),
        }
    }

    /// Make every call of `op` fail with a database error.
    pub fn failing_on(mut self, op: &'static str) -> Self {
        self.recorder.fail_on = Some(op);
        self
    }

    /// Operations seen so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.recorder.log.lock().unwrap().clone()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl LotteryStore for RecordingStore {
    async fn begin(&self) -> StoreResult<Box<dyn LotteryTransaction>> {
        self.recorder.record("begin")?;
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTransaction {
            inner,
            recorder: self.recorder.clone(),
        }))
    }

    async fn snapshot(&self) -> StoreResult<LotterySnapshot> {
        self.recorder.record("snapshot")?;
        self.inner.snapshot().await
    }
}

struct RecordingTransaction {
    inner: Box<dyn LotteryTransaction>,
    recorder: Recorder,
}

#[async_trait]
impl LotteryTransaction for RecordingTransaction {
    async fn lock_user(&mut self, name: &str) -> StoreResult<Option<UserRow>> {
        self.recorder.record("lock_user")?;
        self.inner.lock_user(name).await
    }

    async fn code_exists(&mut self, code: &str) -> StoreResult<bool> {
        self.recorder.record("code_exists")?;
        self.inner.code_exists(code).await
    }

    async fn lock_counter(&mut self, name: &str) -> StoreResult<Option<i64>> {
        self.recorder.record("lock_counter")?;
        self.inner.lock_counter(name).await
    }

    async fn insert_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        self.recorder.record("insert_counter")?;
        self.inner.insert_counter(name, value).await
    }

    async fn update_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        self.recorder.record("update_counter")?;
        self.inner.update_counter(name, value).await
    }

    async fn insert_activated(&mut self, code: &str) -> StoreResult<()> {
        self.recorder.record("insert_activated")?;
        self.inner.insert_activated(code).await
    }

    async fn insert_user(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        self.recorder.record("insert_user")?;
        self.inner.insert_user(name, wins).await
    }

    async fn update_user_wins(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        self.recorder.record("update_user_wins")?;
        self.inner.update_user_wins(name, wins).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.recorder.record("commit")?;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.recorder.record("rollback")?;
        self.inner.rollback().await
    }
}
