use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub booking: BookingPolicy,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `json` включает структурированные логи, иначе обычный fmt
    pub log_format: String,
    /// Токен для админских и служебных маршрутов
    pub admin_token: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// TTL кеша карты мест сеанса, в секундах
    pub seat_map_ttl_secs: u64,
}

/// Правила бронирования: окна удержания и отмены, лимиты.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingPolicy {
    pub hold_window_secs: i64,
    pub cancel_window_secs: i64,
    pub sweep_interval_secs: u64,
    pub max_seats_per_booking: usize,
    pub max_reference_attempts: u32,
    pub sweep_batch_size: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_window_secs: 300,
            cancel_window_secs: 2 * 60 * 60,
            sweep_interval_secs: 60,
            max_seats_per_booking: 10,
            max_reference_attempts: 5,
            sweep_batch_size: 500,
        }
    }
}

impl BookingPolicy {
    pub fn hold_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_window_secs)
    }

    pub fn cancel_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cancel_window_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value.parse().map_err(|_| ConfigError::Invalid { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = BookingPolicy::default();

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parsed("PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "showtime_booking=debug,tower_http=debug"),
                log_format: var_or("LOG_FORMAT", "fmt"),
                admin_token: required("ADMIN_TOKEN")?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parsed("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                seat_map_ttl_secs: parsed("SEAT_MAP_TTL_SECS", "60")?,
            },
            booking: BookingPolicy {
                hold_window_secs: parsed("HOLD_WINDOW_SECS", &defaults.hold_window_secs.to_string())?,
                cancel_window_secs: parsed(
                    "CANCEL_WINDOW_SECS",
                    &defaults.cancel_window_secs.to_string(),
                )?,
                sweep_interval_secs: parsed(
                    "SWEEP_INTERVAL_SECS",
                    &defaults.sweep_interval_secs.to_string(),
                )?,
                max_seats_per_booking: parsed(
                    "MAX_SEATS_PER_BOOKING",
                    &defaults.max_seats_per_booking.to_string(),
                )?,
                max_reference_attempts: parsed(
                    "MAX_REFERENCE_ATTEMPTS",
                    &defaults.max_reference_attempts.to_string(),
                )?,
                sweep_batch_size: parsed("SWEEP_BATCH_SIZE", &defaults.sweep_batch_size.to_string())?,
            },
        })
    }
}
