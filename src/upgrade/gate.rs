// Step gating against the target's persisted step pointer

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::target::{Read, TargetError, TargetSystem, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    NotYetReached,
    Current,
    AlreadyPassed,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GateStatus::NotYetReached => "not yet reached",
            GateStatus::Current => "current",
            GateStatus::AlreadyPassed => "already passed",
        };
        f.write_str(label)
    }
}

/// How a step decides whether it applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gate {
    /// Applies while the step pointer equals the index
    Pointer(u64),
    /// Applies while the pointer equals `at_step` and `flag` has not yet
    /// reached `done_when`
    Flag {
        at_step: u64,
        flag: Read,
        done_when: Value,
    },
}

/// Compare a pointer value against a step index
pub fn classify(pointer: u64, index: u64) -> GateStatus {
    match pointer.cmp(&index) {
        Ordering::Less => GateStatus::NotYetReached,
        Ordering::Equal => GateStatus::Current,
        Ordering::Greater => GateStatus::AlreadyPassed,
    }
}

/// Reads the step pointer once and reports whether `index` is the current step
pub async fn is_current_step(target: &dyn TargetSystem, index: u64) -> Result<bool, TargetError> {
    Ok(target.step_pointer().await? == index)
}

/// Tri-state position of `index` relative to the step pointer, from a single read
pub async fn evaluate(target: &dyn TargetSystem, index: u64) -> Result<GateStatus, TargetError> {
    let pointer = target.step_pointer().await?;
    Ok(classify(pointer, index))
}

/// Flag gates fall back to pointer ordering away from their step, and only
/// read the flag when the pointer sits on it
pub async fn evaluate_flag(
    target: &dyn TargetSystem,
    at_step: u64,
    flag: &Read,
    done_when: &Value,
) -> Result<GateStatus, TargetError> {
    match evaluate(target, at_step).await? {
        GateStatus::Current => {
            if &target.read(flag).await? == done_when {
                Ok(GateStatus::AlreadyPassed)
            } else {
                Ok(GateStatus::Current)
            }
        }
        other => Ok(other),
    }
}

pub async fn evaluate_gate(target: &dyn TargetSystem, gate: &Gate) -> Result<GateStatus, TargetError> {
    match gate {
        Gate::Pointer(index) => evaluate(target, *index).await,
        Gate::Flag {
            at_step,
            flag,
            done_when,
        } => evaluate_flag(target, *at_step, flag, done_when).await,
    }
}

/// For a gate already known to be passed: whether it was passed by the most
/// recent progress. A numbered step qualifies while the pointer sits one past
/// it, a flag step while the pointer still sits on it.
pub async fn passed_at_frontier(target: &dyn TargetSystem, gate: &Gate) -> Result<bool, TargetError> {
    let pointer = target.step_pointer().await?;
    Ok(match gate {
        Gate::Pointer(index) => pointer == index + 1,
        Gate::Flag { at_step, .. } => pointer == *at_step,
    })
}
