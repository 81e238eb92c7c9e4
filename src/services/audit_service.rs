use crate::error::AppResult;
use crate::models::AuditReport;
use crate::services::LotteryRules;
use crate::store::{LotterySnapshot, LotteryStore};
use chrono::Utc;
use std::sync::Arc;

/// 一致性审计
///
/// Checks the invariants the redemption transaction must keep:
/// - counter value equals the number of activated codes
/// - every milestone produced exactly one win
/// - no user exceeds the wins limit
/// - the database never reported a deadlock
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn LotteryStore>,
    rules: LotteryRules,
}

impl AuditService {
    pub fn new(store: Arc<dyn LotteryStore>, rules: LotteryRules) -> Self {
        Self { store, rules }
    }

    pub async fn audit(&self) -> AppResult<AuditReport> {
        let snapshot = self.store.snapshot().await?;
        Ok(evaluate(&snapshot, self.rules))
    }
}

fn evaluate(s: &LotterySnapshot, rules: LotteryRules) -> AuditReport {
    let counter_consistent = s.counter == s.activated;
    let wins_consistent = s.total_wins == s.activated / rules.prize_interval;
    let wins_within_limit = s.max_wins <= rules.wins_limit;
    let deadlock_free = s.deadlocks == 0;

    AuditReport {
        counter: s.counter,
        activated: s.activated,
        total_wins: s.total_wins,
        max_wins: s.max_wins,
        winners: s.winners,
        deadlocks: s.deadlocks,
        counter_consistent,
        wins_consistent,
        wins_within_limit,
        deadlock_free,
        consistent: counter_consistent && wins_consistent && wins_within_limit && deadlock_free,
        checked_at: Utc::now(),
    }
}
