use crate::config::LotteryConfig;
use crate::entities::GLOBAL_COUNTER;
use crate::error::AppResult;
use crate::models::RedeemOutcome;
use crate::store::{LotteryStore, LotteryTransaction, StoreResult};
use crate::utils::is_valid_token;
use std::sync::Arc;

/// 中奖规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotteryRules {
    /// Every `prize_interval`-th activation is a milestone
    pub prize_interval: i64,
    /// Max wins per user
    pub wins_limit: i32,
}

impl Default for LotteryRules {
    fn default() -> Self {
        Self {
            prize_interval: 10,
            wins_limit: 3,
        }
    }
}

impl From<&LotteryConfig> for LotteryRules {
    fn from(config: &LotteryConfig) -> Self {
        Self {
            prize_interval: config.prize_interval,
            wins_limit: config.wins_limit,
        }
    }
}

/// Result of the locking read on `users`. A user without a row has never won
/// and is treated as `wins = 0` without materializing a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockedUser {
    Existing { wins: i32 },
    Virtual,
}

impl LockedUser {
    fn wins(&self) -> i32 {
        match self {
            LockedUser::Existing { wins } => *wins,
            LockedUser::Virtual => 0,
        }
    }
}

/// What to do with the open transaction once the redemption logic finished.
#[derive(Debug)]
enum Decision {
    Commit { outcome: RedeemOutcome, counter: i64 },
    Abort(RedeemOutcome),
}

#[derive(Clone)]
pub struct RedemptionService {
    store: Arc<dyn LotteryStore>,
    rules: LotteryRules,
}

impl RedemptionService {
    pub fn new(store: Arc<dyn LotteryStore>, rules: LotteryRules) -> Self {
        Self { store, rules }
    }

    /// 兑换一个兑换码
    ///
    /// 流程（单个 read-committed 事务）:
    /// 1. 格式校验，不合法直接返回 Wrong，不开启事务
    /// 2. 锁定用户行 (FOR UPDATE)，不存在视为 wins = 0
    /// 3. 中奖次数已达上限 -> 回滚，WinsLimitExceeded
    /// 4. 兑换码已激活 -> 回滚，Repeat
    /// 5. 锁定计数器行并加 1
    /// 6. 写入已激活兑换码（唯一约束冲突 -> 回滚，Repeat）
    /// 7. 计数器为 prize_interval 的倍数 -> 用户 wins + 1，Prize；否则 Success
    ///
    /// Store failures roll the transaction back and come back as `Err`; they
    /// never turn into a business outcome.
    pub async fn redeem(&self, user: &str, code: &str) -> AppResult<RedeemOutcome> {
        if !is_valid_token(user) || !is_valid_token(code) {
            log::debug!("Rejected malformed redemption: user={user:?} code={code:?}");
            return Ok(RedeemOutcome::Wrong);
        }

        let mut txn = self.store.begin().await?;

        let decision = self.apply(&mut *txn, user, code).await;

        match decision {
            Ok(Decision::Commit { outcome, counter }) => {
                txn.commit().await?;
                if outcome == RedeemOutcome::Prize {
                    log::info!("User {user} won a prize with code {code} at activation #{counter}");
                } else {
                    log::debug!("Code {code} activated by {user} as #{counter}");
                }
                Ok(outcome)
            }
            Ok(Decision::Abort(outcome)) => {
                txn.rollback().await?;
                log::debug!("Redemption of {code} by {user} rejected: {outcome}");
                Ok(outcome)
            }
            Err(err) if err.is_duplicate_code() => {
                // 同一兑换码被并发兑换，唯一约束兜底
                txn.rollback().await?;
                log::debug!("Code {code} was activated concurrently, reporting repeat");
                Ok(RedeemOutcome::Repeat)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    log::warn!("Rollback after store error failed: {rollback_err}");
                }
                // error 级别日志由 AppError::error_response 统一输出
                log::debug!("Redemption of {code} by {user} aborted: {err}");
                Err(err.into())
            }
        }
    }

    /// Runs the redemption inside `txn`. Locks are always taken user row
    /// first, counter row second.
    async fn apply(
        &self,
        txn: &mut dyn LotteryTransaction,
        user: &str,
        code: &str,
    ) -> StoreResult<Decision> {
        let locked = match txn.lock_user(user).await? {
            Some(row) => LockedUser::Existing { wins: row.wins },
            None => LockedUser::Virtual,
        };

        if locked.wins() >= self.rules.wins_limit {
            return Ok(Decision::Abort(RedeemOutcome::WinsLimitExceeded));
        }

        if txn.code_exists(code).await? {
            return Ok(Decision::Abort(RedeemOutcome::Repeat));
        }

        let counter = match txn.lock_counter(GLOBAL_COUNTER).await? {
            Some(current) => {
                let next = current + 1;
                txn.update_counter(GLOBAL_COUNTER, next).await?;
                next
            }
            None => {
                txn.insert_counter(GLOBAL_COUNTER, 1).await?;
                1
            }
        };

        txn.insert_activated(code).await?;

        if counter % self.rules.prize_interval != 0 {
            return Ok(Decision::Commit {
                outcome: RedeemOutcome::Success,
                counter,
            });
        }

        match locked {
            LockedUser::Virtual => txn.insert_user(user, 1).await?,
            LockedUser::Existing { wins } => txn.update_user_wins(user, wins + 1).await?,
        }

        Ok(Decision::Commit {
            outcome: RedeemOutcome::Prize,
            counter,
        })
    }
}
