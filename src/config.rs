//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (bookmaker logins) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::bookmakers::betking::BetKingConfig;
use crate::bookmakers::resolver::ResolverConfig;
use crate::engine::worker::WorkerConfig;
use crate::provider::poller::PollerConfig;
use crate::provider::DEFAULT_ALERTS_URL;
use crate::storage::DEFAULT_DATA_DIR;
use crate::strategy::devig::DevigMethod;
use crate::strategy::edge::EvaluatorConfig;
use crate::strategy::kelly::StakeConfig;
use crate::types::{Credentials, EdgeRunnerError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub provider: ProviderConfig,
    pub bookmaker: BookmakerConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Log would-be wagers instead of submitting them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Write the provider dump and correlated-match audit files.
    #[serde(default)]
    pub store_data: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_alerts_url")]
    pub alerts_url: String,
    pub interval_secs: u64,
    #[serde(default = "default_provider_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookmakerConfig {
    pub name: String,
    /// Throttle between queue items.
    pub interval_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_start_tolerance")]
    pub start_tolerance_minutes: i64,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub site_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub fixed_stake_enabled: bool,
    pub fixed_stake: Decimal,
    pub stake_fraction: f64,
    pub min_value_pct: f64,
    #[serde(default)]
    pub min_odds: Option<f64>,
    #[serde(default)]
    pub max_odds: Option<f64>,
    #[serde(default)]
    pub devig_method: DevigMethod,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverSection {
    pub max_combined_score: f64,
    pub max_field_score: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

/// One independent account instance.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub name: String,
    /// Alert provider subscription id.
    pub provider_user_id: String,
    pub username_env: String,
    pub password_env: String,
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_alerts_url() -> String {
    DEFAULT_ALERTS_URL.to_string()
}

fn default_provider_timeout() -> u64 {
    60
}

fn default_call_timeout() -> u64 {
    30
}

fn default_start_tolerance() -> i64 {
    crate::bookmakers::DEFAULT_START_TOLERANCE_MINUTES
}

impl Default for ResolverSection {
    fn default() -> Self {
        let r = ResolverConfig::default();
        Self {
            max_combined_score: r.max_combined_score,
            max_field_score: r.max_field_score,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), EdgeRunnerError> {
        let s = &self.strategy;
        if !(s.stake_fraction > 0.0 && s.stake_fraction <= 1.0) {
            return Err(EdgeRunnerError::Validation(format!(
                "strategy.stake_fraction must be in (0, 1], got {}",
                s.stake_fraction
            )));
        }
        if s.fixed_stake.is_sign_negative() {
            return Err(EdgeRunnerError::Validation(
                "strategy.fixed_stake must not be negative".into(),
            ));
        }
        if s.min_value_pct < 0.0 {
            return Err(EdgeRunnerError::Validation(
                "strategy.min_value_pct must not be negative".into(),
            ));
        }
        if let (Some(lo), Some(hi)) = (s.min_odds, s.max_odds) {
            if lo >= hi {
                return Err(EdgeRunnerError::Validation(format!(
                    "strategy.min_odds ({lo}) must be below max_odds ({hi})"
                )));
            }
        }
        if self.provider.interval_secs == 0 || self.bookmaker.interval_secs == 0 {
            return Err(EdgeRunnerError::Validation(
                "provider and bookmaker intervals must be non-zero".into(),
            ));
        }
        if self.bookmaker.call_timeout_secs == 0 {
            return Err(EdgeRunnerError::Validation(
                "bookmaker.call_timeout_secs must be non-zero".into(),
            ));
        }
        if self.accounts.is_empty() {
            return Err(EdgeRunnerError::Validation(
                "at least one [[accounts]] entry is required".into(),
            ));
        }
        let mut names = HashSet::new();
        for account in &self.accounts {
            if account.provider_user_id.trim().is_empty() {
                return Err(EdgeRunnerError::Validation(format!(
                    "account '{}' has no provider_user_id",
                    account.name
                )));
            }
            if !names.insert(account.name.as_str()) {
                return Err(EdgeRunnerError::Validation(format!(
                    "duplicate account name '{}'",
                    account.name
                )));
            }
        }
        Ok(())
    }

    // -- Component configs -------------------------------------------------

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            min_value_pct: self.strategy.min_value_pct,
            min_odds: self.strategy.min_odds,
            max_odds: self.strategy.max_odds,
            devig_method: self.strategy.devig_method,
        }
    }

    pub fn stake_config(&self) -> StakeConfig {
        StakeConfig {
            fixed_enabled: self.strategy.fixed_stake_enabled,
            fixed_stake: self.strategy.fixed_stake,
            stake_fraction: self.strategy.stake_fraction,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_combined_score: self.resolver.max_combined_score,
            max_field_score: self.resolver.max_field_score,
        }
    }

    pub fn betking_config(&self) -> BetKingConfig {
        let defaults = BetKingConfig::default();
        BetKingConfig {
            search_url: self
                .bookmaker
                .search_url
                .clone()
                .unwrap_or(defaults.search_url),
            site_url: self.bookmaker.site_url.clone().unwrap_or(defaults.site_url),
            request_timeout: Duration::from_secs(self.bookmaker.call_timeout_secs),
            start_tolerance: chrono::Duration::minutes(self.bookmaker.start_tolerance_minutes),
        }
    }

    pub fn poller_config(&self, account: &AccountConfig) -> PollerConfig {
        PollerConfig {
            user_id: account.provider_user_id.clone(),
            interval: Duration::from_secs(self.provider.interval_secs),
            store_data: self.agent.store_data,
        }
    }

    pub fn worker_config(&self, account: &AccountConfig) -> WorkerConfig {
        WorkerConfig {
            name: account.name.clone(),
            throttle: Duration::from_secs(self.bookmaker.interval_secs),
            call_timeout: Duration::from_secs(self.bookmaker.call_timeout_secs),
            store_data: self.agent.store_data,
        }
    }
}

impl AccountConfig {
    /// Resolve the bookmaker login from the environment.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = AppConfig::resolve_env(&self.username_env)
            .with_context(|| format!("Missing username for account '{}'", self.name))?;
        let password = AppConfig::resolve_env(&self.password_env)
            .with_context(|| format!("Missing password for account '{}'", self.name))?;
        Ok(Credentials {
            username,
            password: SecretString::new(password),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
        [agent]
        name = "EDGERUNNER-TEST"

        [provider]
        interval_secs = 20

        [bookmaker]
        name = "betking"
        interval_secs = 10

        [strategy]
        fixed_stake_enabled = true
        fixed_stake = 10.0
        stake_fraction = 0.1
        min_value_pct = 6.0
        min_odds = 1.45
        max_odds = 4.0
        devig_method = "multiplicative"

        [[accounts]]
        name = "main"
        provider_user_id = "user_abc"
        username_env = "EDGERUNNER_TEST_USER"
        password_env = "EDGERUNNER_TEST_PASS"
    "#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert!(cfg.agent.dry_run);
        assert_eq!(cfg.agent.data_dir, "data");
        assert_eq!(cfg.provider.alerts_url, DEFAULT_ALERTS_URL);
        assert_eq!(cfg.provider.request_timeout_secs, 60);
        assert_eq!(cfg.bookmaker.call_timeout_secs, 30);
        assert_eq!(cfg.strategy.fixed_stake, dec!(10));
        assert_eq!(cfg.strategy.devig_method, DevigMethod::Multiplicative);
        assert!(!cfg.dashboard.enabled);
        assert_eq!(cfg.resolver.max_combined_score, 0.25);
        assert_eq!(cfg.accounts.len(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_component_configs() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        let account = &cfg.accounts[0];

        let poller = cfg.poller_config(account);
        assert_eq!(poller.user_id, "user_abc");
        assert_eq!(poller.interval, Duration::from_secs(20));

        let worker = cfg.worker_config(account);
        assert_eq!(worker.name, "main");
        assert_eq!(worker.throttle, Duration::from_secs(10));

        let evaluator = cfg.evaluator_config();
        assert_eq!(evaluator.min_odds, Some(1.45));

        let betking = cfg.betking_config();
        assert_eq!(betking.site_url, BetKingConfig::default().site_url);
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let mut cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        cfg.strategy.stake_fraction = 1.5;
        assert!(matches!(cfg.validate(), Err(EdgeRunnerError::Validation(_))));
        cfg.strategy.stake_fraction = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_odds_window() {
        let mut cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        cfg.strategy.min_odds = Some(5.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_and_missing_accounts() {
        let mut cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        cfg.accounts.push(cfg.accounts[0].clone());
        assert!(cfg.validate().is_err());

        cfg.accounts.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_credentials_from_env() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        let account = AccountConfig {
            username_env: "EDGERUNNER_CFG_TEST_USER_7F3A".into(),
            password_env: "EDGERUNNER_CFG_TEST_PASS_7F3A".into(),
            ..cfg.accounts[0].clone()
        };
        assert!(account.credentials().is_err());

        std::env::set_var("EDGERUNNER_CFG_TEST_USER_7F3A", "0803");
        std::env::set_var("EDGERUNNER_CFG_TEST_PASS_7F3A", "hunter2");
        let creds = account.credentials().unwrap();
        assert_eq!(creds.username, "0803");
        assert_eq!(creds.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_load_config_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
        let cfg = AppConfig::load(path).expect("shipped config.toml should load");
        assert!(cfg.validate().is_ok());
        assert!(!cfg.accounts.is_empty());
    }
}
