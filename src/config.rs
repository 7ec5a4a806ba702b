//! Configuration module for environment variables and application settings

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use solana_sdk::native_token::LAMPORTS_PER_SOL;
use thiserror::Error;

use crate::agent::decision::SwitchPolicy;
use crate::agent::discovery::DiscoveryFilter;
use crate::agent::executor::ExecutorSettings;
use crate::agent::orchestrator::MigrationSettings;
use crate::agent::retry::RetryPolicy;
use crate::agent::scheduler::SchedulerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet the engine trades from
    pub wallet: WalletConfig,

    /// External service endpoints
    pub endpoints: EndpointConfig,

    /// Scan cadence
    pub schedule: ScheduleConfig,

    /// Pool selection and switching rules
    pub strategy: StrategyConfig,

    /// Transaction submission and migration parameters
    pub execution: ExecutionConfig,
}

#[derive(Clone)]
pub struct WalletConfig {
    pub public_key: String,
    /// Base58 encoded 64-byte secret key
    pub private_key: String,
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub rpc_url: String,
    pub yield_api_url: String,
    pub jupiter_api_url: String,
    pub raydium_api_url: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub scan_interval_secs: u64,
    pub scan_jitter_ms: u64,
    /// Run a single cycle and exit
    pub run_once: bool,
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Minimum APY gain, in percentage points, to re-enter the same pool
    pub apy_improvement_threshold: f64,
    pub min_tvl_usd: f64,
    pub min_volume_7d_usd: f64,
    pub target_project: String,
    pub switch_policy: SwitchPolicy,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// SOL kept back for fees and rent
    pub min_sol_reserve: f64,
    pub withdraw_slippage_bps: u16,
    pub deposit_slippage_bps: u16,
    pub deposit_retry_slippage_bps: u16,
    pub swap_slippage_bps: u16,
    /// Jupiter prioritization fee
    pub priority_fee_lamports: u64,
    /// Compute unit price on AMM transactions
    pub compute_unit_price_micro_lamports: u64,
    pub step_delay_min_ms: u64,
    pub step_delay_max_ms: u64,
    pub max_submit_attempts: u32,
    pub rate_limit_backoff_secs: u64,
    pub confirm_poll_attempts: u32,
    pub confirm_poll_interval_ms: u64,
    pub registry_cache_ttl_secs: u64,
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn string_or(env_map: &HashMap<String, String>, key: &str, default: &str) -> String {
    env_map
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(env_map: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError> {
    match env_map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("could not parse '{}' as {}", raw, std::any::type_name::<T>()),
            )
        }),
    }
}

fn bool_or(env_map: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be true or false, got {}", other),
        )),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let switch_policy = env_map
            .get("SWITCH_POLICY")
            .map(|s| s.parse::<SwitchPolicy>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue("SWITCH_POLICY".to_string(), e.to_string()))?
            .unwrap_or_default();

        let config = Config {
            wallet: WalletConfig {
                public_key: required(&env_map, "SOLANA_PUBLIC_KEY")?,
                private_key: required(&env_map, "SOLANA_PRIVATE_KEY")?,
            },

            endpoints: EndpointConfig {
                rpc_url: string_or(&env_map, "SOLANA_RPC_URL", "https://api.mainnet-beta.solana.com"),
                yield_api_url: string_or(&env_map, "YIELD_API_URL", "https://yields.llama.fi"),
                jupiter_api_url: string_or(&env_map, "JUPITER_API_URL", "https://quote-api.jup.ag/v6"),
                raydium_api_url: string_or(&env_map, "RAYDIUM_API_URL", "https://api-v3.raydium.io"),
            },

            schedule: ScheduleConfig {
                scan_interval_secs: parse_or(&env_map, "SCAN_INTERVAL_SECS", 300)?,
                scan_jitter_ms: parse_or(&env_map, "SCAN_JITTER_MS", 1_000)?,
                run_once: bool_or(&env_map, "RUN_ONCE", false)?,
            },

            strategy: StrategyConfig {
                apy_improvement_threshold: parse_or(&env_map, "APY_IMPROVEMENT_THRESHOLD", 0.5)?,
                min_tvl_usd: parse_or(&env_map, "MIN_TVL_USD", 25_000_000.0)?,
                min_volume_7d_usd: parse_or(&env_map, "MIN_VOLUME_7D_USD", 1_000_000.0)?,
                target_project: string_or(&env_map, "TARGET_PROJECT", "raydium-amm"),
                switch_policy,
            },

            execution: ExecutionConfig {
                min_sol_reserve: parse_or(&env_map, "MIN_SOL_RESERVE", 0.05)?,
                withdraw_slippage_bps: parse_or(&env_map, "WITHDRAW_SLIPPAGE_BPS", 100)?,
                deposit_slippage_bps: parse_or(&env_map, "DEPOSIT_SLIPPAGE_BPS", 100)?,
                deposit_retry_slippage_bps: parse_or(&env_map, "DEPOSIT_RETRY_SLIPPAGE_BPS", 1_000)?,
                swap_slippage_bps: parse_or(&env_map, "SWAP_SLIPPAGE_BPS", 50)?,
                priority_fee_lamports: parse_or(&env_map, "PRIORITY_FEE_LAMPORTS", 1_000_000)?,
                compute_unit_price_micro_lamports: parse_or(&env_map, "COMPUTE_UNIT_PRICE_MICRO_LAMPORTS", 50_000)?,
                step_delay_min_ms: parse_or(&env_map, "STEP_DELAY_MIN_MS", 2_000)?,
                step_delay_max_ms: parse_or(&env_map, "STEP_DELAY_MAX_MS", 7_000)?,
                max_submit_attempts: parse_or(&env_map, "MAX_SUBMIT_ATTEMPTS", 3)?,
                rate_limit_backoff_secs: parse_or(&env_map, "RATE_LIMIT_BACKOFF_SECS", 10)?,
                confirm_poll_attempts: parse_or(&env_map, "CONFIRM_POLL_ATTEMPTS", 30)?,
                confirm_poll_interval_ms: parse_or(&env_map, "CONFIRM_POLL_INTERVAL_MS", 1_000)?,
                registry_cache_ttl_secs: parse_or(&env_map, "REGISTRY_CACHE_TTL_SECS", 300)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let execution = &self.execution;
        if execution.step_delay_min_ms > execution.step_delay_max_ms {
            return Err(ConfigError::InvalidValue(
                "STEP_DELAY_MIN_MS".to_string(),
                "must not exceed STEP_DELAY_MAX_MS".to_string(),
            ));
        }
        if execution.max_submit_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_SUBMIT_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if execution.confirm_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "CONFIRM_POLL_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if !(execution.min_sol_reserve >= 0.0 && execution.min_sol_reserve.is_finite()) {
            return Err(ConfigError::InvalidValue(
                "MIN_SOL_RESERVE".to_string(),
                "must be a non-negative amount of SOL".to_string(),
            ));
        }
        if self.strategy.apy_improvement_threshold < 0.0 {
            return Err(ConfigError::InvalidValue(
                "APY_IMPROVEMENT_THRESHOLD".to_string(),
                "must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_sol_reserve_lamports(&self) -> u64 {
        (self.execution.min_sol_reserve * LAMPORTS_PER_SOL as f64).round() as u64
    }

    pub fn discovery_filter(&self) -> DiscoveryFilter {
        DiscoveryFilter {
            project: self.strategy.target_project.clone(),
            min_tvl_usd: self.strategy.min_tvl_usd,
            min_volume_7d_usd: self.strategy.min_volume_7d_usd,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_submit_attempts: self.execution.max_submit_attempts,
            rate_limit_backoff: Duration::from_secs(self.execution.rate_limit_backoff_secs),
            confirm_poll_attempts: self.execution.confirm_poll_attempts,
            confirm_poll_interval: Duration::from_millis(self.execution.confirm_poll_interval_ms),
        }
    }

    pub fn migration_settings(&self) -> MigrationSettings {
        MigrationSettings {
            withdraw_slippage_bps: self.execution.withdraw_slippage_bps,
            deposit_slippage_bps: self.execution.deposit_slippage_bps,
            deposit_retry_slippage_bps: self.execution.deposit_retry_slippage_bps,
            swap_slippage_bps: self.execution.swap_slippage_bps,
            min_native_reserve: self.min_sol_reserve_lamports(),
            step_delay_min: Duration::from_millis(self.execution.step_delay_min_ms),
            step_delay_max: Duration::from_millis(self.execution.step_delay_max_ms),
            read_retry: self.read_retry_policy(),
        }
    }

    /// Transient registry and chain read failures share the submission budget
    /// and its fixed backoff.
    pub fn read_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.execution.max_submit_attempts,
            Duration::from_secs(self.execution.rate_limit_backoff_secs),
        )
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.schedule.scan_interval_secs),
            jitter: Duration::from_millis(self.schedule.scan_jitter_ms),
            threshold_pct: self.strategy.apy_improvement_threshold,
            policy: self.strategy.switch_policy,
            run_once: self.schedule.run_once,
        }
    }
}
