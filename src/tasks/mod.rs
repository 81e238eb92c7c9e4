//! Background scheduled tasks.
//!
//! Call `spawn_all` once during startup; tasks are detached via `tokio::spawn`.

use crate::services::AuditService;

/// Spawn all background tasks.
///
/// `audit_interval_secs == 0` disables the periodic consistency audit.
pub fn spawn_all(audit_service: AuditService, audit_interval_secs: u64) {
    if audit_interval_secs == 0 {
        log::debug!("Periodic audit disabled");
        return;
    }

    // 定期检查 计数器 / 已激活兑换码 / 中奖次数 是否一致
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(audit_interval_secs);
        loop {
            match audit_service.audit().await {
                Ok(report) if report.consistent => log::debug!(
                    "Audit ok: counter={} activated={} total_wins={}",
                    report.counter,
                    report.activated,
                    report.total_wins
                ),
                Ok(report) => log::warn!("Audit found inconsistent state: {report:?}"),
                Err(e) => log::error!("Failed to run audit: {e:?}"),
            }
            tokio::time::sleep(period).await;
        }
    });
}
