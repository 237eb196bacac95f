// Ordered step list, run until the first halt

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use super::errors::UpgradeError;
use super::intent::TransactionIntent;
use super::lifecycle::StepPhase;
use super::runner::{StepOutcome, StepRunner};
use super::step::Step;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub label: String,
    pub phase: StepPhase,
}

/// Why a run stopped before the end of the list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Halt {
    NotReached { step: String },
    AwaitingExternal { step: String, intents: Vec<TransactionIntent> },
    Failed { step: String, error: UpgradeError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub sequence: String,
    pub steps: Vec<StepReport>,
    pub halt: Option<Halt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.halt.is_none()
    }

    pub fn phase_of(&self, label: &str) -> Option<StepPhase> {
        self.steps.iter().find(|s| s.label == label).map(|s| s.phase)
    }

    /// Only failures are errors; waiting on a manual signer is a normal exit
    pub fn into_result(self) -> Result<RunReport, UpgradeError> {
        match self.halt {
            Some(Halt::Failed { error, .. }) => Err(error),
            _ => Ok(self),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    name: String,
    tags: Vec<String>,
    steps: Vec<Step>,
}

impl Sequencer {
    /// Steps are ordered by index; flag pre-steps go before the numbered
    /// step sharing their index, otherwise declaration order is kept
    pub fn new(name: &str, tags: &[&str], mut steps: Vec<Step>) -> Self {
        steps.sort_by_key(Step::sort_key);
        Self {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub async fn run(&self, runner: &StepRunner<'_>) -> RunReport {
        info!(sequence = %self.name, steps = self.steps.len(), authority = ?runner.authority(), "Starting sequence");
        let mut report = RunReport {
            sequence: self.name.clone(),
            steps: Vec::with_capacity(self.steps.len()),
            halt: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        for (position, step) in self.steps.iter().enumerate() {
            let outcome = runner
                .run_before(step, self.steps.get(position + 1))
                .instrument(info_span!("step", label = %step.label, index = step.index))
                .await;

            report.steps.push(StepReport {
                label: step.label.clone(),
                phase: outcome.phase(),
            });

            let label = step.label.clone();
            report.halt = match outcome {
                StepOutcome::Skipped | StepOutcome::Done => continue,
                StepOutcome::NotReached => Some(Halt::NotReached { step: label }),
                StepOutcome::AwaitingExternal { intents } => {
                    Some(Halt::AwaitingExternal { step: label, intents })
                }
                StepOutcome::Failed { error } => Some(Halt::Failed { step: label, error }),
            };
            break;
        }

        report.finished_at = Utc::now();
        match &report.halt {
            None => info!(sequence = %self.name, "Sequence complete"),
            Some(halt) => info!(sequence = %self.name, halt = ?halt, "Sequence halted"),
        }
        report
    }
}
