use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::upgrade::poller::{PollConfig, DEFAULT_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

pub const DEFAULT_CONFIG_FILE: &str = "bridge-upgrade.toml";
const ENV_PREFIX: &str = "BRIDGE_UPGRADE";

/// Deployment configuration for the bridge upgrade
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpgradeConfig {
    /// Address allowed to sign dictator calls directly
    pub controller: String,
    /// Receives ProxyAdmin ownership on finalize
    pub final_system_owner: String,
    pub l2_output_oracle_starting_block_number: u64,
    /// Negative means "use the timestamp of `l1_starting_block_tag`"
    pub l2_output_oracle_starting_timestamp: i64,
    pub l1_starting_block_tag: String,
    /// Deployed address per contract role
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    pub chain: ChainConfig,
    pub polling: PollingConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChainConfig {
    /// L1 JSON-RPC endpoint
    pub rpc_url: String,
    /// Path to Foundry's `cast` binary
    pub cast_path: String,
    /// Signing key for controller mode (prefer the env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollingConfig {
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            controller: String::new(),
            final_system_owner: String::new(),
            l2_output_oracle_starting_block_number: 0,
            l2_output_oracle_starting_timestamp: -1,
            l1_starting_block_tag: "latest".to_string(),
            addresses: BTreeMap::new(),
            chain: ChainConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                cast_path: "cast".to_string(),
                private_key: None,
            },
            polling: PollingConfig {
                timeout_ms: DEFAULT_TIMEOUT_MS,
                interval_ms: DEFAULT_INTERVAL_MS,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl UpgradeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `path`, or `bridge-upgrade.toml` in the working directory
    /// 3. Environment variables (`BRIDGE_UPGRADE_CHAIN__RPC_URL`, ...)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&UpgradeConfig::default()).context("Failed to build default configuration")?,
        );

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration")?;
        let upgrade_config: UpgradeConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(upgrade_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), toml_content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::from_millis(self.polling.timeout_ms, self.polling.interval_ms)
    }

    /// Configured address of a role. Role names match ignoring case since
    /// environment overrides arrive lowercased.
    pub fn address(&self, role: &str) -> Option<&str> {
        self.addresses
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(role))
            .map(|(_, address)| address.as_str())
    }

    /// Roles from `roles` with no configured address
    pub fn missing_roles<'a>(&self, roles: &[&'a str]) -> Vec<&'a str> {
        roles
            .iter()
            .copied()
            .filter(|role| self.address(role).is_none())
            .collect()
    }
}
