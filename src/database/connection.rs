use crate::config::{DatabaseConfig, StorageBackend};
use crate::error::AppResult;
use crate::store::{LotteryStore, MemoryStore, SeaOrmStore};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;

pub type DbPool = DatabaseConnection;

pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    Migrator::up(pool, None).await?;
    Ok(())
}

/// 根据配置创建存储；database 后端会先跑迁移
pub async fn create_store(config: &DatabaseConfig) -> AppResult<Arc<dyn LotteryStore>> {
    match config.backend {
        StorageBackend::Database => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            log::info!("Using database store");
            Ok(Arc::new(SeaOrmStore::new(pool, config.lock_timeout())))
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory store, state is lost on restart");
            Ok(Arc::new(MemoryStore::seeded(config.lock_timeout())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_backend_store_is_seeded() {
        let config = DatabaseConfig {
            backend: StorageBackend::Memory,
            url: String::new(),
            max_connections: 1,
            lock_timeout_ms: 100,
        };
        assert_eq!(config.lock_timeout(), Duration::from_millis(100));

        let store = create_store(&config).await.unwrap();
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.counter, 0);
        assert_eq!(snapshot.activated, 0);
    }
}
