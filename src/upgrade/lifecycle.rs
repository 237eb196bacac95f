use serde::Serialize;
use statig::prelude::*;
use std::fmt;

use super::gate::GateStatus;

/// Where a step is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Pending,
    Skipped,
    NotReached,
    Executing,
    AwaitingExternal,
    Verifying,
    Done,
    Failed,
}

impl StepPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            StepPhase::Pending | StepPhase::Executing | StepPhase::Verifying
        )
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepPhase::Pending => "pending",
            StepPhase::Skipped => "skipped",
            StepPhase::NotReached => "not reached",
            StepPhase::Executing => "executing",
            StepPhase::AwaitingExternal => "awaiting external execution",
            StepPhase::Verifying => "verifying",
            StepPhase::Done => "done",
            StepPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Gate(GateStatus),
    /// Controller action performed (or nothing to perform)
    ActionPerformed,
    /// Manual intents handed off; `halt` ends this invocation
    IntentsEmitted { halt: bool },
    /// An external actor already executed the manual action
    AlreadyConverged,
    /// The gate has just been passed; only post-conditions remain
    Settled,
    Converged,
    ChecksPassed,
    Failed,
}

/// Per-step state machine. Illegal events are ignored, so the phase only
/// ever moves along the edges below.
#[derive(Debug)]
pub struct StepLifecycle {
    step: String,
    phase: StepPhase,
    history: Vec<StepPhase>,
    converged: bool,
}

impl StepLifecycle {
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            phase: StepPhase::Pending,
            history: vec![StepPhase::Pending],
            converged: false,
        }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// Phases visited, starting with `Pending`
    pub fn history(&self) -> &[StepPhase] {
        &self.history
    }

    fn enter(&mut self, phase: StepPhase) {
        tracing::debug!(step = %self.step, from = %self.phase, to = %phase, "Step phase change");
        self.phase = phase;
        self.history.push(phase);
    }
}

#[state_machine(initial = "State::pending()")]
impl StepLifecycle {
    #[state]
    fn pending(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Gate(GateStatus::AlreadyPassed) => {
                self.enter(StepPhase::Skipped);
                Transition(State::finished())
            }
            LifecycleEvent::Gate(GateStatus::NotYetReached) => {
                self.enter(StepPhase::NotReached);
                Transition(State::finished())
            }
            LifecycleEvent::Gate(GateStatus::Current) => {
                self.enter(StepPhase::Executing);
                Transition(State::executing())
            }
            LifecycleEvent::Settled => {
                self.converged = true;
                self.enter(StepPhase::Verifying);
                Transition(State::verifying())
            }
            LifecycleEvent::Failed => {
                self.enter(StepPhase::Failed);
                Transition(State::finished())
            }
            _ => Handled,
        }
    }

    #[state]
    fn executing(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::ActionPerformed | LifecycleEvent::IntentsEmitted { halt: false } => {
                self.enter(StepPhase::Verifying);
                Transition(State::verifying())
            }
            LifecycleEvent::AlreadyConverged => {
                self.converged = true;
                self.enter(StepPhase::Verifying);
                Transition(State::verifying())
            }
            LifecycleEvent::IntentsEmitted { halt: true } => {
                self.enter(StepPhase::AwaitingExternal);
                Transition(State::finished())
            }
            LifecycleEvent::Failed => {
                self.enter(StepPhase::Failed);
                Transition(State::finished())
            }
            _ => Handled,
        }
    }

    #[state]
    fn verifying(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Converged => {
                self.converged = true;
                Handled
            }
            LifecycleEvent::ChecksPassed if self.converged => {
                self.enter(StepPhase::Done);
                Transition(State::finished())
            }
            LifecycleEvent::Failed => {
                self.enter(StepPhase::Failed);
                Transition(State::finished())
            }
            _ => Handled,
        }
    }

    #[state]
    fn finished(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        tracing::trace!(step = %self.step, ?event, "Event ignored after terminal phase");
        Handled
    }
}
