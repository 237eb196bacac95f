use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::UpgradeConfig;
use crate::external::{CastClient, ProcessCommandExecutor};
use crate::target::{roles, InMemoryTarget, Snapshot, TargetSystem};

pub mod init_config;
pub mod run;
pub mod status;
pub mod steps;

/// Per-command ceiling on a single `cast` invocation
const CAST_TIMEOUT: Duration = Duration::from_secs(120);

/// Where reads and writes go for one invocation
pub enum Backend {
    Chain(CastClient),
    Rehearsal { target: InMemoryTarget, path: PathBuf },
}

impl Backend {
    pub fn open(config: &UpgradeConfig, state_file: Option<&Path>) -> Result<Self> {
        match state_file {
            Some(path) => {
                let snapshot = Snapshot::load(path)?;
                info!(path = %path.display(), pointer = snapshot.step_pointer, "Rehearsing against snapshot");
                Ok(Backend::Rehearsal {
                    target: InMemoryTarget::new(snapshot),
                    path: path.to_path_buf(),
                })
            }
            None => {
                let missing = config.missing_roles(roles::ALL);
                if !missing.is_empty() {
                    warn!(roles = ?missing, "No address configured; steps touching these contracts will fail");
                }
                let mut executor = ProcessCommandExecutor::new().with_timeout(CAST_TIMEOUT);
                if let Some(key) = &config.chain.private_key {
                    executor = executor.with_env("ETH_PRIVATE_KEY", key);
                }
                let client = CastClient::new(Arc::new(executor), &config.chain.cast_path, &config.chain.rpc_url)
                    .with_addresses(&config.addresses);
                info!(rpc_url = %config.chain.rpc_url, "Using chain backend");
                Ok(Backend::Chain(client))
            }
        }
    }

    pub fn target(&self) -> &dyn TargetSystem {
        match self {
            Backend::Chain(client) => client,
            Backend::Rehearsal { target, .. } => target,
        }
    }

    /// Write the rehearsal snapshot back; the chain needs nothing
    pub fn persist(&self) -> Result<()> {
        if let Backend::Rehearsal { target, path } = self {
            target
                .snapshot()
                .save(path)
                .with_context(|| format!("Failed to update rehearsal state {}", path.display()))?;
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<UpgradeConfig> {
    UpgradeConfig::load(path).context("Failed to load bridge-upgrade configuration")
}
