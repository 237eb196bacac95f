//! Staged upgrade orchestration
//!
//! A [`Sequencer`] walks a fixed list of [`Step`]s. Each step is gated on the
//! target's step pointer, performs its action (or hands unsigned
//! transactions to a manual signer), waits for the target to converge and
//! then verifies its post-conditions. All durable progress lives in the
//! target, so re-running a sequence resumes where it stopped.

pub mod assertion;
pub mod errors;
pub mod events;
pub mod gate;
pub mod intent;
pub mod lifecycle;
pub mod plan;
pub mod poller;
pub mod runner;
pub mod sequencer;
pub mod step;

pub use assertion::{assert_equals, verify, Check};
pub use errors::UpgradeError;
pub use events::{ConsoleNarrator, EventSink, RecordingSink, UpgradeEvent};
pub use gate::{evaluate, evaluate_flag, evaluate_gate, is_current_step, passed_at_frontier, Gate, GateStatus};
pub use intent::{build_intent, TransactionIntent};
pub use lifecycle::{LifecycleEvent, StepLifecycle, StepPhase};
pub use poller::{ConditionPoller, PollConfig, PollError, PollSuccess, Probe};
pub use runner::{StepOutcome, StepRunner};
pub use sequencer::{Halt, RunReport, Sequencer, StepReport};
pub use step::{Authority, ControllerAction, Convergence, Expectation, ManualWait, Step, StepAction};
