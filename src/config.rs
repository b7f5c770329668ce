//! Configuration management for the formula deployer
//!
//! Loads settings from a TOML file and the network registry from JSON, both
//! with environment variable substitution.

use crate::error::{DeployerError, DeployerResult};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "FORMULA_DEPLOYER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deployer: DeployerConfig,
    pub transactions: TransactionConfig,
    pub compiler: CompilerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub formulas_dir: PathBuf,
    pub networks_file: PathBuf,
    pub private_key_env: String,
    /// Context name under which the signer's own address is recorded
    pub deployer_name: String,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            formulas_dir: PathBuf::from("formulas"),
            networks_file: PathBuf::from("networks.json"),
            private_key_env: "PRIVATE_KEY".to_string(),
            deployer_name: "deployer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub priority_fee_gwei: u64,
    pub legacy_gas_price_percent: u64,
    pub deploy_gas_headroom_percent: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
            confirmation_timeout_secs: 120,
            receipt_poll_interval_ms: 1_000,
            priority_fee_gwei: 2,
            legacy_gas_price_percent: 120,
            deploy_gas_headroom_percent: 130,
        }
    }
}

impl TransactionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub solc_path: String,
    pub optimizer_runs: u32,
    pub verification_output: PathBuf,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            solc_path: "solc".to_string(),
            optimizer_runs: 200,
            verification_output: PathBuf::from("verification_input.json"),
        }
    }
}

impl Settings {
    /// Load settings from the configured file, or defaults when none exists
    pub fn load() -> DeployerResult<Self> {
        match env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from(default_path)
                } else {
                    tracing::debug!("No settings file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> DeployerResult<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            DeployerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| DeployerError::Config(format!("Failed to parse configuration: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> DeployerResult<()> {
        if self.transactions.max_attempts == 0 {
            return Err(DeployerError::Config(
                "transactions.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.deployer.deployer_name.is_empty() {
            return Err(DeployerError::Config(
                "deployer.deployer_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One entry of the network registry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub rpc_url: String,
}

/// All networks a formula may target
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Vec<NetworkConfig>,
}

impl NetworkRegistry {
    /// Load the registry from a JSON file
    pub fn load(path: &Path) -> DeployerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployerError::Config(format!("Failed to read network registry {:?}: {}", path, e))
        })?;

        Self::parse(&substitute_env_vars(&content))
    }

    pub fn parse(content: &str) -> DeployerResult<Self> {
        let networks: Vec<NetworkConfig> = serde_json::from_str(content)
            .map_err(|e| DeployerError::Config(format!("Invalid network registry: {}", e)))?;

        let mut seen = HashSet::new();
        for network in &networks {
            if !seen.insert(network.id.as_str()) {
                return Err(DeployerError::Config(format!(
                    "Duplicate network id '{}' in registry",
                    network.id
                )));
            }
        }

        Ok(Self { networks })
    }

    /// Select a network by exact id
    pub fn get(&self, id: &str) -> DeployerResult<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| DeployerError::NetworkNotFound { id: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }
}

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
