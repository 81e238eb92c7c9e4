use super::{
    DeadlockCounter, LotterySnapshot, LotteryStore, LotteryTransaction, StoreError, StoreResult,
    Table, UserRow,
};
use crate::entities::{
    GLOBAL_COUNTER, activated_code_entity as activated, counter_entity as counters,
    user_entity as users,
};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    AccessMode, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, IsolationLevel, NotSet, PaginatorTrait, QueryFilter,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use std::time::Duration;

/// sea-orm backed store (Postgres / MySQL).
#[derive(Clone)]
pub struct SeaOrmStore {
    pool: DatabaseConnection,
    lock_timeout: Duration,
    deadlocks: DeadlockCounter,
}

impl SeaOrmStore {
    pub fn new(pool: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self {
            pool,
            lock_timeout,
            deadlocks: DeadlockCounter::default(),
        }
    }
}

/// Statement that bounds how long a locking read may wait inside the
/// current transaction.
fn lock_timeout_statement(backend: DatabaseBackend, timeout: Duration) -> Option<String> {
    match backend {
        DatabaseBackend::Postgres => Some(format!(
            "SET LOCAL lock_timeout = '{}ms'",
            timeout.as_millis()
        )),
        // innodb_lock_wait_timeout 只支持整秒
        DatabaseBackend::MySql => Some(format!(
            "SET SESSION innodb_lock_wait_timeout = {}",
            timeout.as_secs().max(1)
        )),
        DatabaseBackend::Sqlite => None,
    }
}

fn is_lock_timeout(err: &DbErr) -> bool {
    let msg = err.to_string();
    // Postgres: "canceling statement due to lock timeout"
    // MySQL:    "Lock wait timeout exceeded; try restarting transaction"
    msg.contains("lock timeout") || msg.contains("Lock wait timeout")
}

fn is_deadlock(err: &DbErr) -> bool {
    let msg = err.to_string();
    // Postgres 40P01: "deadlock detected"
    // MySQL 1213:     "Deadlock found when trying to get lock; try restarting transaction"
    msg.contains("deadlock detected") || msg.contains("Deadlock found")
}

/// Map a driver error on `table`/`key` into the store taxonomy.
fn classify(err: DbErr, table: Table, key: &str) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return StoreError::UniqueViolation {
            table,
            key: key.to_owned(),
        };
    }
    if is_deadlock(&err) {
        return StoreError::Deadlock(format!("{table}/{key}"));
    }
    if is_lock_timeout(&err) {
        return StoreError::LockTimeout(format!("{table}/{key}"));
    }
    StoreError::Database(err)
}

#[async_trait]
impl LotteryStore for SeaOrmStore {
    async fn begin(&self) -> StoreResult<Box<dyn LotteryTransaction>> {
        let txn = self
            .pool
            .begin_with_config(Some(IsolationLevel::ReadCommitted), None)
            .await?;

        if let Some(sql) = lock_timeout_statement(txn.get_database_backend(), self.lock_timeout) {
            txn.execute_unprepared(&sql).await?;
        }

        Ok(Box::new(SeaOrmTransaction {
            txn,
            deadlocks: self.deadlocks.clone(),
        }))
    }

    async fn snapshot(&self) -> StoreResult<LotterySnapshot> {
        // 三个查询放在同一个只读快照里，避免读到中间状态
        let txn = self
            .pool
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await?;

        let counter = counters::Entity::find_by_id(GLOBAL_COUNTER.to_owned())
            .one(&txn)
            .await?
            .map(|m| m.value)
            .unwrap_or(0);

        let activated = activated::Entity::find().count(&txn).await? as i64;

        let wins: Vec<i32> = users::Entity::find()
            .select_only()
            .column(users::Column::Wins)
            .into_tuple()
            .all(&txn)
            .await?;

        txn.commit().await?;

        Ok(LotterySnapshot {
            deadlocks: self.deadlocks.get(),
            ..LotterySnapshot::from_wins(counter, activated, wins)
        })
    }
}

pub struct SeaOrmTransaction {
    txn: DatabaseTransaction,
    deadlocks: DeadlockCounter,
}

impl SeaOrmTransaction {
    fn fail(&self, err: DbErr, table: Table, key: &str) -> StoreError {
        self.deadlocks.record(classify(err, table, key))
    }
}

#[async_trait]
impl LotteryTransaction for SeaOrmTransaction {
    async fn lock_user(&mut self, name: &str) -> StoreResult<Option<UserRow>> {
        let row = users::Entity::find_by_id(name.to_owned())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(|e| self.fail(e, Table::Users, name))?;

        Ok(row.map(|m| UserRow {
            name: m.name,
            wins: m.wins,
        }))
    }

    async fn code_exists(&mut self, code: &str) -> StoreResult<bool> {
        let found = activated::Entity::find_by_id(code.to_owned())
            .count(&self.txn)
            .await
            .map_err(|e| self.fail(e, Table::Activated, code))?;
        Ok(found > 0)
    }

    async fn lock_counter(&mut self, name: &str) -> StoreResult<Option<i64>> {
        let row = counters::Entity::find_by_id(name.to_owned())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(|e| self.fail(e, Table::Counters, name))?;
        Ok(row.map(|m| m.value))
    }

    async fn insert_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        counters::Entity::insert(counters::ActiveModel {
            name: Set(name.to_owned()),
            value: Set(value),
        })
        .exec_without_returning(&self.txn)
        .await
        .map_err(|e| self.fail(e, Table::Counters, name))?;
        Ok(())
    }

    async fn update_counter(&mut self, name: &str, value: i64) -> StoreResult<()> {
        let res = counters::Entity::update_many()
            .col_expr(counters::Column::Value, Expr::value(value))
            .filter(counters::Column::Name.eq(name))
            .exec(&self.txn)
            .await
            .map_err(|e| self.fail(e, Table::Counters, name))?;

        if res.rows_affected == 0 {
            return Err(StoreError::RowMissing {
                table: Table::Counters,
                key: name.to_owned(),
            });
        }
        Ok(())
    }

    async fn insert_activated(&mut self, code: &str) -> StoreResult<()> {
        activated::Entity::insert(activated::ActiveModel {
            code: Set(code.to_owned()),
            activated_at: NotSet,
        })
        .exec_without_returning(&self.txn)
        .await
        .map_err(|e| self.fail(e, Table::Activated, code))?;
        Ok(())
    }

    async fn insert_user(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        users::Entity::insert(users::ActiveModel {
            name: Set(name.to_owned()),
            wins: Set(wins),
        })
        .exec_without_returning(&self.txn)
        .await
        .map_err(|e| self.fail(e, Table::Users, name))?;
        Ok(())
    }

    async fn update_user_wins(&mut self, name: &str, wins: i32) -> StoreResult<()> {
        let res = users::Entity::update_many()
            .col_expr(users::Column::Wins, Expr::value(wins))
            .filter(users::Column::Name.eq(name))
            .exec(&self.txn)
            .await
            .map_err(|e| self.fail(e, Table::Users, name))?;

        if res.rows_affected == 0 {
            return Err(StoreError::RowMissing {
                table: Table::Users,
                key: name.to_owned(),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}
