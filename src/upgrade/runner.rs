// Executes one step: gate, action (or intents), convergence, post-conditions

use serde::Serialize;
use statig::prelude::*;
use tracing::{debug, info, instrument, warn};

use super::assertion::{self, Check};
use super::errors::UpgradeError;
use super::events::{EventSink, UpgradeEvent};
use super::gate::{self, Gate, GateStatus};
use super::intent::{build_intent, TransactionIntent};
use super::lifecycle::{LifecycleEvent, StepLifecycle, StepPhase};
use super::poller::{ConditionPoller, PollError, Probe};
use super::step::{Authority, ControllerAction, Convergence, ManualWait, Step, StepAction};
use crate::target::{Call, TargetError, TargetSystem};

/// Result of a single step invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Skipped,
    NotReached,
    /// Intents handed to the manual signer; re-invoke once they land
    AwaitingExternal { intents: Vec<TransactionIntent> },
    Done,
    Failed { error: UpgradeError },
}

impl StepOutcome {
    pub fn phase(&self) -> StepPhase {
        match self {
            StepOutcome::Skipped => StepPhase::Skipped,
            StepOutcome::NotReached => StepPhase::NotReached,
            StepOutcome::AwaitingExternal { .. } => StepPhase::AwaitingExternal,
            StepOutcome::Done => StepPhase::Done,
            StepOutcome::Failed { .. } => StepPhase::Failed,
        }
    }

    /// Whether the sequence may move on to the next step
    pub fn proceeds(&self) -> bool {
        matches!(self, StepOutcome::Skipped | StepOutcome::Done)
    }
}

pub struct StepRunner<'a> {
    target: &'a dyn TargetSystem,
    authority: Authority,
    poller: ConditionPoller,
    sink: &'a dyn EventSink,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        target: &'a dyn TargetSystem,
        authority: Authority,
        poller: ConditionPoller,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            target,
            authority,
            poller,
            sink,
        }
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Run `step` on its own, as if it were the last of its sequence
    pub async fn run(&self, step: &Step) -> StepOutcome {
        self.run_before(step, None).await
    }

    /// Run `step` ahead of `next`. A step whose gate was passed by the latest
    /// progress gets its post-conditions verified instead of being skipped,
    /// unless `next` has already moved past it.
    #[instrument(skip(self, step, next), fields(step = %step.label, authority = ?self.authority))]
    pub async fn run_before(&self, step: &Step, next: Option<&Step>) -> StepOutcome {
        let mut lifecycle = StepLifecycle::new(&step.label).state_machine();

        let status = match gate::evaluate_gate(self.target, &step.gate).await {
            Ok(status) => status,
            Err(e) => return self.fail(step, &mut lifecycle, UpgradeError::Read(e)),
        };
        debug!(gate = %status, "Gate evaluated");

        match status {
            GateStatus::AlreadyPassed => match self.is_settled(step, next).await {
                Ok(true) => return self.verify_settled(step, &mut lifecycle).await,
                Ok(false) => {
                    self.advance(step, &mut lifecycle, LifecycleEvent::Gate(status));
                    return StepOutcome::Skipped;
                }
                Err(e) => return self.fail(step, &mut lifecycle, UpgradeError::Read(e)),
            },
            GateStatus::NotYetReached => {
                self.advance(step, &mut lifecycle, LifecycleEvent::Gate(status));
                info!("Step not reached yet; earlier steps are still pending");
                return StepOutcome::NotReached;
            }
            GateStatus::Current => self.advance(step, &mut lifecycle, LifecycleEvent::Gate(status)),
        }

        self.narrate(step);

        match step.action_for(self.authority) {
            StepAction::Direct(action) => {
                if let Err(e) = self.perform(step, action).await {
                    return self.fail(step, &mut lifecycle, e);
                }
                self.advance(step, &mut lifecycle, LifecycleEvent::ActionPerformed);
            }
            StepAction::Deferred(calls) => {
                // Someone may already have executed the intents out-of-band
                match self.probe_convergence(&step.convergence).await {
                    Ok(probe) if probe.satisfied => {
                        info!("Manual action already took effect");
                        self.advance(step, &mut lifecycle, LifecycleEvent::AlreadyConverged);
                    }
                    Ok(_) => {
                        let intents = match self.emit_intents(step, calls).await {
                            Ok(intents) => intents,
                            Err(e) => return self.fail(step, &mut lifecycle, e),
                        };
                        let halt = step.manual_wait == ManualWait::Halt;
                        self.advance(step, &mut lifecycle, LifecycleEvent::IntentsEmitted { halt });
                        if halt {
                            return StepOutcome::AwaitingExternal { intents };
                        }
                    }
                    Err(e) => return self.fail(step, &mut lifecycle, UpgradeError::Read(e)),
                }
            }
        }

        if let Err(e) = self.await_convergence(step).await {
            return self.fail(step, &mut lifecycle, e);
        }
        self.advance(step, &mut lifecycle, LifecycleEvent::Converged);

        if let Err(e) = self.run_checks(step, &step.post_conditions).await {
            return self.fail(step, &mut lifecycle, e);
        }
        self.advance(step, &mut lifecycle, LifecycleEvent::ChecksPassed);

        StepOutcome::Done
    }

    /// Numbered steps land out-of-band only for a manual signer; the
    /// controller verified its own in the run that submitted them
    async fn is_settled(&self, step: &Step, next: Option<&Step>) -> Result<bool, TargetError> {
        if matches!(step.gate, Gate::Pointer(_)) && self.authority == Authority::Controller {
            return Ok(false);
        }
        if !gate::passed_at_frontier(self.target, &step.gate).await? {
            return Ok(false);
        }
        // Later progress may legitimately change what this step left behind
        match next {
            Some(next) => Ok(gate::evaluate_gate(self.target, &next.gate).await? != GateStatus::AlreadyPassed),
            None => Ok(true),
        }
    }

    async fn verify_settled(&self, step: &Step, lifecycle: &mut StateMachine<StepLifecycle>) -> StepOutcome {
        info!("Step already took effect; verifying post-conditions");
        self.advance(step, lifecycle, LifecycleEvent::Settled);
        // Observe-only steps never act, so this is their only chance to speak
        if matches!(step.action_for(self.authority), StepAction::Direct(ControllerAction::Observe)) {
            self.narrate(step);
        }

        if let Err(e) = self.run_checks(step, &step.post_conditions).await {
            return self.fail(step, lifecycle, e);
        }
        self.advance(step, lifecycle, LifecycleEvent::ChecksPassed);
        StepOutcome::Done
    }

    fn advance(&self, step: &Step, lifecycle: &mut StateMachine<StepLifecycle>, event: LifecycleEvent) {
        let before = lifecycle.inner().phase();
        lifecycle.handle(&event);
        let after = lifecycle.inner().phase();
        if before != after {
            self.sink.emit(UpgradeEvent::PhaseChanged {
                step: step.label.clone(),
                phase: after,
            });
        }
    }

    fn fail(
        &self,
        step: &Step,
        lifecycle: &mut StateMachine<StepLifecycle>,
        error: UpgradeError,
    ) -> StepOutcome {
        warn!(error = %error, "Step failed");
        self.advance(step, lifecycle, LifecycleEvent::Failed);
        StepOutcome::Failed { error }
    }

    fn narrate(&self, step: &Step) {
        if let Some(warning) = &step.irreversible {
            self.sink.emit(UpgradeEvent::IrreversibleWarning {
                step: step.label.clone(),
                text: warning.clone(),
            });
        }
        if !step.description.trim().is_empty() {
            self.sink.emit(UpgradeEvent::Guidance {
                step: step.label.clone(),
                text: step.description.clone(),
            });
        }
    }

    async fn perform(&self, step: &Step, action: &ControllerAction) -> Result<(), UpgradeError> {
        match action {
            ControllerAction::Direct { call } => {
                info!(function = %call.function, role = %call.role, "Submitting controller call");
                let receipt = self.target.submit(call).await?;
                self.sink.emit(UpgradeEvent::Submitted {
                    step: step.label.clone(),
                    function: call.function.clone(),
                    tx_hash: receipt.tx_hash,
                });
                Ok(())
            }
            ControllerAction::Observe => {
                debug!("Nothing to submit; waiting for the target to converge");
                Ok(())
            }
        }
    }

    async fn emit_intents(&self, step: &Step, calls: &[Call]) -> Result<Vec<TransactionIntent>, UpgradeError> {
        let mut intents = Vec::with_capacity(calls.len());
        // Encode everything before printing anything
        for call in calls {
            intents.push(build_intent(self.target, call).await?);
        }
        for intent in &intents {
            self.sink.emit(UpgradeEvent::IntentEmitted {
                step: step.label.clone(),
                intent: intent.clone(),
            });
        }
        Ok(intents)
    }

    async fn probe_convergence(&self, convergence: &Convergence) -> Result<Probe, TargetError> {
        match convergence {
            Convergence::PointerBeyond { index } => {
                let pointer = self.target.step_pointer().await?;
                Ok(Probe::new(pointer > *index, format!("step pointer {pointer}")))
            }
            Convergence::Reads { expectations } => {
                for expectation in expectations {
                    let actual = self.target.read(&expectation.read).await?;
                    if actual != expectation.expected {
                        return Ok(Probe::new(
                            false,
                            format!("{} = {actual}", expectation.read.label()),
                        ));
                    }
                }
                Ok(Probe::new(true, "all expectations hold"))
            }
        }
    }

    async fn await_convergence(&self, step: &Step) -> Result<(), UpgradeError> {
        let runner = self;
        let convergence = &step.convergence;

        match self
            .poller
            .await_probe(move || runner.probe_convergence(convergence))
            .await
        {
            Ok(success) => {
                self.sink.emit(UpgradeEvent::Converged {
                    step: step.label.clone(),
                    attempts: success.attempts,
                    elapsed_ms: success.elapsed.as_millis() as u64,
                });
                Ok(())
            }
            Err(PollError::Timeout {
                elapsed,
                attempts,
                last_observed,
            }) => Err(UpgradeError::ConvergenceTimeout {
                condition: describe(convergence),
                elapsed_ms: elapsed.as_millis() as u64,
                attempts,
                last_observed,
            }),
            Err(PollError::Predicate(e)) => Err(UpgradeError::Read(e)),
        }
    }

    /// Checks run in declared order; the first failure stops the rest
    async fn run_checks(&self, step: &Step, checks: &[Check]) -> Result<(), UpgradeError> {
        for check in checks {
            assertion::verify(self.target, check).await?;
            self.sink.emit(UpgradeEvent::CheckPassed {
                step: step.label.clone(),
                property: check.property(),
            });
        }
        Ok(())
    }
}

fn describe(convergence: &Convergence) -> String {
    match convergence {
        Convergence::PointerBeyond { index } => format!("step pointer past {index}"),
        Convergence::Reads { expectations } => expectations
            .iter()
            .map(|e| format!("{} == {}", e.read.label(), e.expected))
            .collect::<Vec<_>>()
            .join(" and "),
    }
}
