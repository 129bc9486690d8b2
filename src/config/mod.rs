use serde::Deserialize;
use std::env;

use crate::services::pricing::DEFAULT_SERVICE_FEE;

/// Top-level service configuration.
///
/// Loaded from built-in defaults, then an optional `booking.toml`, then
/// `BOOKING_*` environment variables (`BOOKING_BOOKING__SERVICE_FEE=50`), then the
/// plain `DATABASE_URL` / `REDIS_URL` / `PORT` / `RUST_LOG` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub booking: BookingConfig,
    pub payment: PaymentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `"pretty"` or `"json"`.
    pub log_format: String,
    /// Offset used to turn a calendar `date` filter into an instant range.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// No URL means the in-memory store.
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// No URL means in-process seat holds.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub service_fee: u32,
    pub hold_ttl_seconds: u64,
    pub max_commit_attempts: u32,
    pub hold_sweep_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub merchant_secret: String,
    pub currency: String,
    /// When set, every reservation must carry a verified payment confirmation.
    pub require_confirmation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                environment: "development".to_string(),
                rust_log: "showtime_booking=debug,tower_http=debug".to_string(),
                log_format: "pretty".to_string(),
                utc_offset_minutes: 0,
            },
            database: DatabaseConfig {
                url: None,
                pool_size: 20,
            },
            redis: RedisConfig { url: None },
            booking: BookingConfig {
                service_fee: DEFAULT_SERVICE_FEE,
                hold_ttl_seconds: 300,
                max_commit_attempts: 3,
                hold_sweep_seconds: 60,
            },
            payment: PaymentConfig {
                merchant_id: "cinema".to_string(),
                merchant_secret: "change-me".to_string(),
                currency: "RUB".to_string(),
                require_confirmation: false,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let d = Config::default();

        let builder = config::Config::builder()
            .set_default("app.host", d.app.host)?
            .set_default("app.port", i64::from(d.app.port))?
            .set_default("app.environment", d.app.environment)?
            .set_default("app.rust_log", d.app.rust_log)?
            .set_default("app.log_format", d.app.log_format)?
            .set_default("app.utc_offset_minutes", i64::from(d.app.utc_offset_minutes))?
            .set_default("database.pool_size", i64::from(d.database.pool_size))?
            .set_default("booking.service_fee", i64::from(d.booking.service_fee))?
            .set_default("booking.hold_ttl_seconds", d.booking.hold_ttl_seconds as i64)?
            .set_default("booking.max_commit_attempts", i64::from(d.booking.max_commit_attempts))?
            .set_default("booking.hold_sweep_seconds", d.booking.hold_sweep_seconds as i64)?
            .set_default("payment.merchant_id", d.payment.merchant_id)?
            .set_default("payment.merchant_secret", d.payment.merchant_secret)?
            .set_default("payment.currency", d.payment.currency)?
            .set_default("payment.require_confirmation", d.payment.require_confirmation)?
            .add_source(config::File::with_name("booking").required(false))
            .add_source(
                config::Environment::with_prefix("BOOKING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", env::var("REDIS_URL").ok())?
            .set_override_option("app.port", env::var("PORT").ok())?
            .set_override_option("app.rust_log", env::var("RUST_LOG").ok())?;

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.booking.max_commit_attempts == 0 {
            return Err(config::ConfigError::Message(
                "booking.max_commit_attempts must be at least 1".to_string(),
            ));
        }
        if self.booking.hold_ttl_seconds == 0 {
            return Err(config::ConfigError::Message(
                "booking.hold_ttl_seconds must be at least 1".to_string(),
            ));
        }
        if self.app.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(config::ConfigError::Message(format!(
                "app.utc_offset_minutes {} is out of range",
                self.app.utc_offset_minutes
            )));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.booking.service_fee, 40);
        assert_eq!(config.booking.hold_ttl_seconds, 300);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn zero_commit_attempts_is_rejected() {
        let mut config = Config::default();
        config.booking.max_commit_attempts = 0;
        assert!(config.validate().is_err());
    }
}
