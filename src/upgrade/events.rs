// Narration side channel
//
// The runner reports what it does as structured events keyed by step. The
// console narrator turns them into operator guidance; tests record them.

use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, warn};

use super::intent::TransactionIntent;
use super::lifecycle::StepPhase;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpgradeEvent {
    PhaseChanged { step: String, phase: StepPhase },
    Guidance { step: String, text: String },
    IrreversibleWarning { step: String, text: String },
    Submitted { step: String, function: String, tx_hash: String },
    IntentEmitted { step: String, intent: TransactionIntent },
    Converged { step: String, attempts: u32, elapsed_ms: u64 },
    CheckPassed { step: String, property: String },
}

impl UpgradeEvent {
    pub fn step(&self) -> &str {
        match self {
            UpgradeEvent::PhaseChanged { step, .. }
            | UpgradeEvent::Guidance { step, .. }
            | UpgradeEvent::IrreversibleWarning { step, .. }
            | UpgradeEvent::Submitted { step, .. }
            | UpgradeEvent::IntentEmitted { step, .. }
            | UpgradeEvent::Converged { step, .. }
            | UpgradeEvent::CheckPassed { step, .. } => step,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UpgradeEvent);
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UpgradeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UpgradeEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn intents(&self) -> Vec<TransactionIntent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpgradeEvent::IntentEmitted { intent, .. } => Some(intent),
                _ => None,
            })
            .collect()
    }

    pub fn phases(&self, step: &str) -> Vec<StepPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpgradeEvent::PhaseChanged { step: s, phase } if s == step => Some(phase),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: UpgradeEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Prints operator guidance and unsigned transactions; mirrors every event to tracing
pub struct ConsoleNarrator<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleNarrator<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleNarrator<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render(event: &UpgradeEvent) -> Option<String> {
        match event {
            UpgradeEvent::PhaseChanged { .. } | UpgradeEvent::CheckPassed { .. } => None,
            UpgradeEvent::Guidance { text, .. } => Some(format!("\n{}\n", dedent(text))),
            UpgradeEvent::IrreversibleWarning { step, text } => Some(format!(
                "\n⚠️  WARNING: {step} cannot be undone.\n{}\n",
                dedent(text)
            )),
            UpgradeEvent::Submitted { step, function, tx_hash } => {
                Some(format!("📤 {step}: submitted {function} ({tx_hash})"))
            }
            UpgradeEvent::IntentEmitted { step, intent } => Some(format!(
                "Please execute {} for {step}...\n{} address: {}\nJSON:\n{}",
                intent.function, intent.target, intent.to, intent.serialized
            )),
            UpgradeEvent::Converged { step, attempts, elapsed_ms } => Some(format!(
                "✅ {step} took effect ({attempts} checks, {elapsed_ms}ms)"
            )),
        }
    }
}

impl<W: Write + Send> EventSink for ConsoleNarrator<W> {
    fn emit(&self, event: UpgradeEvent) {
        match &event {
            UpgradeEvent::IrreversibleWarning { step, .. } => {
                warn!(step = %step, "Irreversible step about to run");
            }
            UpgradeEvent::PhaseChanged { step, phase } => {
                info!(step = %step, phase = %phase, "Step phase");
            }
            other => {
                info!(step = %other.step(), event = ?other, "Upgrade event");
            }
        }

        if let Some(text) = Self::render(&event) {
            let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Narration is advisory; a closed stdout must not abort the upgrade
            let _ = writeln!(out, "{text}");
            let _ = out.flush();
        }
    }
}

/// Strip the common indentation of a multi-line message
fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Role;

    #[test]
    fn test_dedent() {
        let text = "\n      Step 3 will clear state.\n      You WILL NOT be able to restart.\n    ";
        assert_eq!(
            dedent(text),
            "Step 3 will clear state.\nYou WILL NOT be able to restart."
        );
    }

    #[test]
    fn test_console_narrator_prints_intent_json() {
        let narrator = ConsoleNarrator::new(Vec::new());
        let intent = TransactionIntent {
            target: Role::new("SystemDictatorProxy"),
            to: "0x00000000000000000000000000000000000000d1".to_string(),
            function: "step4()".to_string(),
            payload: vec![1],
            value: 0,
            serialized: "{\"to\":\"0x00000000000000000000000000000000000000d1\"}".to_string(),
        };

        narrator.emit(UpgradeEvent::IrreversibleWarning {
            step: "step 4".to_string(),
            text: "Ownership moves.".to_string(),
        });
        narrator.emit(UpgradeEvent::IntentEmitted {
            step: "step 4".to_string(),
            intent,
        });

        let output = String::from_utf8(narrator.into_inner()).unwrap();
        assert!(output.contains("WARNING: step 4 cannot be undone."));
        assert!(output.contains("SystemDictatorProxy address: 0x00000000000000000000000000000000000000d1"));
        assert!(output.contains("JSON:\n{\"to\""));
    }

    #[test]
    fn test_recording_sink_filters_by_step() {
        let sink = RecordingSink::new();
        sink.emit(UpgradeEvent::PhaseChanged {
            step: "step 3".to_string(),
            phase: StepPhase::Skipped,
        });
        sink.emit(UpgradeEvent::PhaseChanged {
            step: "step 4".to_string(),
            phase: StepPhase::Executing,
        });

        assert_eq!(sink.phases("step 4"), vec![StepPhase::Executing]);
        assert!(sink.intents().is_empty());
    }
}
