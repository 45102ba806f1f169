use crate::domain::coin::{CoinLedger, DEFAULT_DENOMINATIONS};
use crate::infrastructure::password::Argon2Hasher;
use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Prefix of every environment variable the machine reads.
pub const ENV_PREFIX: &str = "VENDING_MACHINE";

/// Longest accepted token lifetime, ten years.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3_650;
/// Longest accepted session retention, a hundred years.
pub const MAX_SESSION_RETENTION_DAYS: i64 = 36_500;

/// Argon2 cost parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HashingSettings {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HMAC key for signing tokens.
    pub secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default = "default_accepted_coins")]
    pub accepted_coins: Vec<u64>,
    /// Days inactive sessions are kept. `0` keeps them forever.
    #[serde(default = "default_session_retention_days")]
    pub session_retention_days: i64,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub hashing: HashingSettings,
}

fn default_token_ttl_days() -> i64 {
    30
}

fn default_accepted_coins() -> Vec<u64> {
    DEFAULT_DENOMINATIONS.to_vec()
}

fn default_session_retention_days() -> i64 {
    90
}

fn default_memory_kib() -> u32 {
    argon2::Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    argon2::Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

impl Settings {
    /// Loads `.env`, then the optional config file, then `VENDING_MACHINE_*`
    /// variables, then the command-line overrides.
    ///
    /// Nested keys use `__` in variable names, e.g.
    /// `VENDING_MACHINE_HASHING__MEMORY_KIB=8`.
    pub fn load(config_file: Option<&Path>, db_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("accepted_coins"),
            )
            .set_override_option(
                "db_path",
                db_path.map(|path| path.to_string_lossy().into_owned()),
            )?
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::Message("secret must not be empty".to_string()));
        }
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&self.token_ttl_days) {
            return Err(ConfigError::Message(format!(
                "token_ttl_days must be between 1 and {MAX_TOKEN_TTL_DAYS}"
            )));
        }
        if !(0..=MAX_SESSION_RETENTION_DAYS).contains(&self.session_retention_days) {
            return Err(ConfigError::Message(format!(
                "session_retention_days must be between 0 and {MAX_SESSION_RETENTION_DAYS}"
            )));
        }
        self.ledger()
            .map_err(|e| ConfigError::Message(format!("accepted_coins: {e}")))?;
        self.hasher()
            .map_err(|e| ConfigError::Message(format!("hashing: {e}")))?;
        Ok(())
    }

    pub fn ledger(&self) -> crate::error::Result<CoinLedger> {
        CoinLedger::new(self.accepted_coins.iter().copied())
    }

    pub fn hasher(&self) -> crate::error::Result<Argon2Hasher> {
        Argon2Hasher::with_params(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
        )
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::days(self.token_ttl_days)
    }

    pub fn session_retention(&self) -> Option<Duration> {
        (self.session_retention_days > 0).then(|| Duration::days(self.session_retention_days))
    }
}
