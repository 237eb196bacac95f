use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::UpgradeConfig;
use crate::target::roles;

pub struct InitConfigCommand {
    pub path: PathBuf,
    pub force: bool,
}

impl InitConfigCommand {
    pub fn new(path: PathBuf) -> Self {
        Self { path, force: false }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn execute(&self) -> Result<()> {
        if self.path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                self.path.display()
            );
        }

        let mut config = UpgradeConfig::default();
        for role in roles::ALL {
            config
                .addresses
                .insert(role.to_string(), crate::target::ZERO_ADDRESS.to_string());
        }

        config.save_to_file(&self.path)?;
        println!("✅ Wrote {}", self.path.display());
        println!("   Fill in the controller, final owner and contract addresses before running.");
        Ok(())
    }
}
