use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, Instrument};

use super::{load_config, Backend};
use crate::telemetry;
use crate::upgrade::{
    plan, Authority, ConditionPoller, ConsoleNarrator, EventSink, Halt, RunReport, StepPhase, StepRunner,
};

pub struct RunCommand {
    pub tag: String,
    pub account: String,
    pub config: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub json: bool,
}

impl RunCommand {
    pub fn new(tag: &str, account: &str) -> Self {
        Self {
            tag: tag.to_string(),
            account: account.to_string(),
            config: None,
            state_file: None,
            json: false,
        }
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    pub fn with_state_file(mut self, state_file: Option<PathBuf>) -> Self {
        self.state_file = state_file;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let backend = Backend::open(&config, self.state_file.as_deref())?;
        let authority = Authority::detect(&self.account, &config.controller);

        let sequencer = plan::build(&config, authority, backend.target())
            .await
            .context("Failed to build the upgrade plan")?;

        if !sequencer.matches_tag(&self.tag) {
            println!("📋 No upgrade sequence is tagged '{}'", self.tag);
            return Ok(());
        }

        if !self.json {
            let mode = match authority {
                Authority::Controller => "controller: transactions are signed and sent directly",
                Authority::Manual => "manual: transactions are printed for an external signer",
            };
            println!("🔧 {} ({mode})", sequencer.name());
        }

        // Keep stdout clean for the JSON report
        let narrator: Box<dyn EventSink> = if self.json {
            Box::new(ConsoleNarrator::new(std::io::stderr()))
        } else {
            Box::new(ConsoleNarrator::stdout())
        };

        let correlation_id = telemetry::generate_correlation_id();
        let span = telemetry::create_run_span(sequencer.name(), &self.tag, &self.account, &correlation_id);
        let runner = StepRunner::new(
            backend.target(),
            authority,
            ConditionPoller::new(config.poll_config()),
            narrator.as_ref(),
        );

        let report = sequencer.run(&runner).instrument(span).await;
        backend.persist()?;
        info!(correlation_id = %correlation_id, complete = report.is_complete(), "Run finished");

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_summary(&report);
        }

        report
            .into_result()
            .map(|_| ())
            .context("Upgrade halted; fix the cause and re-run to resume")
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("📋 {}:", report.sequence);
    for step in &report.steps {
        let icon = match step.phase {
            StepPhase::Skipped => "⏭️ ",
            StepPhase::Done => "✅",
            StepPhase::AwaitingExternal => "⏸️ ",
            StepPhase::NotReached => "⏳",
            StepPhase::Failed => "❌",
            _ => "•",
        };
        println!("   {icon} {}: {}", step.label, step.phase);
    }

    match &report.halt {
        None => println!("\n🎉 Upgrade sequence complete"),
        Some(Halt::AwaitingExternal { step, intents }) => {
            println!(
                "\n💡 {step} needs {} transaction(s) executed out-of-band; re-run once they land",
                intents.len()
            );
        }
        Some(Halt::NotReached { step }) => {
            println!("\n💡 {step} is not reached yet; an earlier step is still pending");
        }
        Some(Halt::Failed { step, error }) => {
            println!("\n❌ {step} failed: {error}");
            if error.is_resumable() {
                println!("💡 The target may still catch up; re-run to resume from {step}");
            }
        }
    }
}
