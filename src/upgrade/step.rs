// Static step definitions

use serde::Serialize;

use super::assertion::Check;
use super::gate::Gate;
use crate::target::{roles, Call, Read, Value};

/// Whether the caller may sign mutating calls itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Controller,
    Manual,
}

impl Authority {
    /// The caller is the controller when the addresses match, ignoring case
    pub fn detect(caller: &str, controller: &str) -> Self {
        if caller.trim().eq_ignore_ascii_case(controller.trim()) {
            Authority::Controller
        } else {
            Authority::Manual
        }
    }
}

/// What the controller does when a step is current
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerAction {
    Direct { call: Call },
    /// Nothing to submit; the step only observes
    Observe,
}

/// Capability-checked action for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction<'a> {
    Direct(&'a ControllerAction),
    Deferred(&'a [Call]),
}

/// Property that must hold for a step's action to count as landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expectation {
    pub read: Read,
    pub expected: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Convergence {
    /// The target moved its own pointer past this index
    PointerBeyond { index: u64 },
    /// Every expectation reads as expected
    Reads { expectations: Vec<Expectation> },
}

/// What a manual-mode invocation does after emitting its intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualWait {
    /// Exit; the operator re-invokes once the transactions land
    Halt,
    /// Keep polling for convergence within the same invocation
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub index: u64,
    pub label: String,
    pub description: String,
    pub gate: Gate,
    /// Printed as a warning before the action; marks the step irreversible
    pub irreversible: Option<String>,
    pub controller: ControllerAction,
    pub manual: Vec<Call>,
    pub convergence: Convergence,
    pub post_conditions: Vec<Check>,
    pub manual_wait: ManualWait,
}

impl Step {
    /// A dictator step: `stepN()` for both modes, converged once the pointer moves on
    pub fn numbered(index: u64, description: &str) -> Self {
        let call = Call::new(roles::SYSTEM_DICTATOR, &format!("step{index}()"));
        Self {
            index,
            label: format!("step {index}"),
            description: description.to_string(),
            gate: Gate::Pointer(index),
            irreversible: None,
            controller: ControllerAction::Direct { call: call.clone() },
            manual: vec![call],
            convergence: Convergence::PointerBeyond { index },
            post_conditions: Vec::new(),
            manual_wait: ManualWait::Halt,
        }
    }

    /// A pre-step gated on a boolean flag while the pointer sits at `at_step`
    pub fn flagged(label: &str, at_step: u64, flag: Read, done_when: bool, description: &str) -> Self {
        let done_when = Value::Bool(done_when);
        Self {
            index: at_step,
            label: label.to_string(),
            description: description.to_string(),
            gate: Gate::Flag {
                at_step,
                flag: flag.clone(),
                done_when: done_when.clone(),
            },
            irreversible: None,
            controller: ControllerAction::Observe,
            manual: Vec::new(),
            convergence: Convergence::Reads {
                expectations: vec![Expectation {
                    read: flag,
                    expected: done_when,
                }],
            },
            post_conditions: Vec::new(),
            manual_wait: ManualWait::Poll,
        }
    }

    pub fn irreversible(mut self, warning: &str) -> Self {
        self.irreversible = Some(warning.to_string());
        self
    }

    pub fn controller_call(mut self, call: Call) -> Self {
        self.controller = ControllerAction::Direct { call };
        self
    }

    pub fn observe_only(mut self) -> Self {
        self.controller = ControllerAction::Observe;
        self
    }

    pub fn manual_calls(mut self, calls: Vec<Call>) -> Self {
        self.manual = calls;
        self
    }

    pub fn converges_when(mut self, expectations: Vec<Expectation>) -> Self {
        self.convergence = Convergence::Reads { expectations };
        self
    }

    pub fn manual_wait(mut self, wait: ManualWait) -> Self {
        self.manual_wait = wait;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.post_conditions.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.post_conditions.extend(checks);
        self
    }

    pub fn action_for(&self, authority: Authority) -> StepAction<'_> {
        match authority {
            Authority::Controller => StepAction::Direct(&self.controller),
            Authority::Manual => StepAction::Deferred(&self.manual),
        }
    }

    /// Flag pre-steps sort ahead of the numbered step they share an index with
    pub(crate) fn sort_key(&self) -> (u64, bool) {
        (self.index, matches!(self.gate, Gate::Pointer(_)))
    }
}

impl Expectation {
    pub fn new(read: Read, expected: Value) -> Self {
        Self { read, expected }
    }
}
