use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// 一致性审计结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditReport {
    /// Global counter value
    pub counter: i64,
    /// Number of activated codes
    pub activated: i64,
    /// Sum of all users' wins
    pub total_wins: i64,
    /// Highest win count of a single user
    pub max_wins: i32,
    /// Users who won at least once
    pub winners: i64,
    /// Deadlocks reported by the database since startup
    pub deadlocks: u64,
    /// counter == activated
    pub counter_consistent: bool,
    /// total_wins == activated / prize_interval
    pub wins_consistent: bool,
    /// max_wins <= wins_limit
    pub wins_within_limit: bool,
    /// deadlocks == 0
    pub deadlock_free: bool,
    pub consistent: bool,
    pub checked_at: DateTime<Utc>,
}
