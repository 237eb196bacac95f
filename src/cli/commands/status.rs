use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{load_config, Backend};
use crate::upgrade::{evaluate_gate, plan, Authority, GateStatus};

/// Read-only view of where the upgrade stands
pub struct StatusCommand {
    pub config: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl StatusCommand {
    pub fn new(config: Option<PathBuf>, state_file: Option<PathBuf>) -> Self {
        Self { config, state_file }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let backend = Backend::open(&config, self.state_file.as_deref())?;
        let target = backend.target();

        let pointer = target
            .step_pointer()
            .await
            .context("Failed to read the step pointer")?;
        // Gates do not depend on who is asking
        let sequencer = plan::build(&config, Authority::Manual, target)
            .await
            .context("Failed to build the upgrade plan")?;

        println!("📊 {} - step pointer at {pointer}", sequencer.name());
        println!();

        for step in sequencer.steps() {
            let status = evaluate_gate(target, &step.gate)
                .await
                .with_context(|| format!("Failed to evaluate {}", step.label))?;
            let icon = match status {
                GateStatus::AlreadyPassed => "✅",
                GateStatus::Current => "👉",
                GateStatus::NotYetReached => "⏳",
            };
            let irreversible = if step.irreversible.is_some() { " (irreversible)" } else { "" };
            println!("   {icon} {}: {status}{irreversible}", step.label);
        }

        Ok(())
    }
}
