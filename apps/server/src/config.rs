//! Application configuration.

use std::time::Duration;
use thiserror::Error;
use walletwatch_engine::PollerConfig;
use walletwatch_feeds::HeliusConfig;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Poll interval must be positive")]
    ZeroPollInterval,
    #[error("Dedup window must be positive")]
    ZeroDedupWindow,
    #[error("Helius API key is required (--helius-api-key or HELIUS_API_KEY)")]
    MissingApiKey,
    #[error("Page limit must be between 1 and 100, got {0}")]
    InvalidPageLimit(u32),
    #[error("Invalid URL for {name}: {value}")]
    InvalidUrl { name: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub dedup_window_ms: u64,
    pub helius_api_key: String,
    pub helius_api_url: String,
    pub rpc_url: String,
    pub page_limit: u32,
    /// Chat deliveries are disabled without a token.
    pub telegram_bot_token: Option<String>,
    pub database_url: String,
    pub log_level: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("dedup_window_ms", &self.dedup_window_ms)
            .field("helius_api_url", &self.helius_api_url)
            .field("rpc_url", &self.rpc_url)
            .field("page_limit", &self.page_limit)
            .field("telegram", &self.telegram_bot_token.is_some())
            .field("database_url", &self.database_url)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15_000,
            dedup_window_ms: 45_000,
            helius_api_key: String::new(),
            helius_api_url: "https://api.helius.xyz".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            page_limit: 20,
            telegram_bot_token: None,
            database_url: "sqlite://walletwatch.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        })
    }
}

impl AppConfig {
    /// Reject settings the poller or source cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.dedup_window_ms == 0 {
            return Err(ConfigError::ZeroDedupWindow);
        }
        if self.helius_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(1..=100).contains(&self.page_limit) {
            return Err(ConfigError::InvalidPageLimit(self.page_limit));
        }
        check_url("helius-api-url", &self.helius_api_url)?;
        check_url("rpc-url", &self.rpc_url)?;
        Ok(())
    }

    /// Blank tokens count as absent.
    pub fn telegram_token(&self) -> Option<&str> {
        self.telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl From<&AppConfig> for PollerConfig {
    fn from(config: &AppConfig) -> Self {
        PollerConfig {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            dedup_window: Duration::from_millis(config.dedup_window_ms),
        }
    }
}

impl From<&AppConfig> for HeliusConfig {
    fn from(config: &AppConfig) -> Self {
        HeliusConfig {
            api_key: config.helius_api_key.trim().to_string(),
            api_base_url: config.helius_api_url.clone(),
            rpc_url: config.rpc_url.clone(),
            page_limit: config.page_limit,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> AppConfig {
        AppConfig {
            helius_api_key: "key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_requires_api_key() {
        assert_eq!(AppConfig::default().validate(), Err(ConfigError::MissingApiKey));
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_durations() {
        let config = AppConfig {
            poll_interval_ms: 0,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));

        let config = AppConfig {
            dedup_window_ms: 0,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDedupWindow));
    }

    #[test]
    fn test_rejects_bad_page_limit_and_urls() {
        let config = AppConfig {
            page_limit: 0,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPageLimit(0)));

        let config = AppConfig {
            rpc_url: "api.mainnet-beta.solana.com".to_string(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { name: "rpc-url", .. })
        ));
    }

    #[test]
    fn test_telegram_token_blank_is_none() {
        let mut config = valid();
        assert_eq!(config.telegram_token(), None);
        config.telegram_bot_token = Some("  ".to_string());
        assert_eq!(config.telegram_token(), None);
        config.telegram_bot_token = Some("123:abc".to_string());
        assert_eq!(config.telegram_token(), Some("123:abc"));
    }

    #[test]
    fn test_conversions() {
        let config = AppConfig {
            poll_interval_ms: 5_000,
            dedup_window_ms: 10_000,
            page_limit: 50,
            ..valid()
        };
        let poller: PollerConfig = (&config).into();
        assert_eq!(poller.poll_interval, Duration::from_secs(5));
        assert_eq!(poller.dedup_window, Duration::from_secs(10));

        let helius: HeliusConfig = (&config).into();
        assert_eq!(helius.api_key, "key");
        assert_eq!(helius.page_limit, 50);
        assert_eq!(helius.rpc_url, config.rpc_url);
    }
}
