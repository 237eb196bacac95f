use anyhow::Result;
use std::path::PathBuf;

use super::load_config;
use crate::upgrade::plan::{self, PlanInputs};
use crate::upgrade::{Authority, ControllerAction, Gate};

pub struct StepsCommand {
    pub config: Option<PathBuf>,
}

impl StepsCommand {
    pub fn new(config: Option<PathBuf>) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let sequencer = plan::assemble(&PlanInputs::placeholder(&config), Authority::Controller);

        println!("📋 {} [{}]", sequencer.name(), sequencer.tags().join(", "));
        for step in sequencer.steps() {
            let gate = match &step.gate {
                Gate::Pointer(index) => format!("pointer = {index}"),
                Gate::Flag { at_step, flag, done_when } => {
                    format!("pointer = {at_step} until {} == {done_when}", flag.label())
                }
            };
            let action = match &step.controller {
                ControllerAction::Direct { call } => call.label(),
                ControllerAction::Observe => "observe".to_string(),
            };

            println!();
            println!("   {} ({gate})", step.label);
            println!("      action: {action}, {} check(s)", step.post_conditions.len());
            if step.irreversible.is_some() {
                println!("      ⚠️  irreversible");
            }
            if let Some(summary) = step.description.lines().map(str::trim).find(|l| !l.is_empty()) {
                println!("      {summary}");
            }
        }
        Ok(())
    }
}
