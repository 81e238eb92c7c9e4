use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lottery: LotteryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where redemption state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Postgres / MySQL through sea-orm
    #[default]
    Database,
    /// Process-local store, lost on restart
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(StorageBackend::Database),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::ConfigError(format!(
                "Unknown storage backend: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// 抽奖规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Every `prize_interval`-th activation wins a prize
    #[serde(default = "default_prize_interval")]
    pub prize_interval: i64,
    /// Max prizes a single user may win
    #[serde(default = "default_wins_limit")]
    pub wins_limit: i32,
    /// Period of the background consistency audit, 0 disables it
    #[serde(default)]
    pub audit_interval_secs: u64,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            prize_interval: default_prize_interval(),
            wins_limit: default_wins_limit(),
            audit_interval_secs: 0,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_prize_interval() -> i64 {
    10
}

fn default_wins_limit() -> i32 {
    3
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                Config {
                    server: ServerConfig {
                        host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        backend: StorageBackend::default(),
                        url: String::new(),
                        max_connections: default_max_connections(),
                        lock_timeout_ms: default_lock_timeout_ms(),
                    },
                    lottery: LotteryConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Cannot read config file {config_path}: {e}"
                )));
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(config_str: &str) -> AppResult<Self> {
        toml::from_str(config_str)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {e}")))
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("STORAGE_BACKEND") {
            self.database.backend = v.parse()?;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("DB_LOCK_TIMEOUT_MS")
            && let Ok(ms) = v.parse()
        {
            self.database.lock_timeout_ms = ms;
        }
        if let Ok(v) = env::var("LOTTERY_PRIZE_INTERVAL")
            && let Ok(n) = v.parse()
        {
            self.lottery.prize_interval = n;
        }
        if let Ok(v) = env::var("LOTTERY_WINS_LIMIT")
            && let Ok(n) = v.parse()
        {
            self.lottery.wins_limit = n;
        }
        if let Ok(v) = env::var("LOTTERY_AUDIT_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            self.lottery.audit_interval_secs = n;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.database.backend == StorageBackend::Database && self.database.url.is_empty() {
            return Err(AppError::ConfigError(
                "DATABASE_URL is required when the storage backend is `database`".into(),
            ));
        }
        if self.database.lock_timeout_ms == 0 {
            return Err(AppError::ConfigError(
                "lock_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.lottery.prize_interval <= 0 {
            return Err(AppError::ConfigError(
                "prize_interval must be greater than 0".into(),
            ));
        }
        if self.lottery.wins_limit <= 0 {
            return Err(AppError::ConfigError(
                "wins_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
