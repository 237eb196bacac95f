// Bridge Upgrade Library - staged, resumable upgrade orchestration
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod external;
pub mod target;
pub mod telemetry;
pub mod upgrade;

// Re-export key types for easy access
pub use config::UpgradeConfig;
pub use external::{CastClient, CastError, CommandExecutor, ProcessCommandExecutor};
pub use target::{Call, InMemoryTarget, Read, Role, Snapshot, TargetError, TargetSystem, Value, ValueKind};
pub use telemetry::{create_run_span, generate_correlation_id};
pub use upgrade::{
    Authority, ConditionPoller, PollConfig, RunReport, Sequencer, Step, StepOutcome, StepPhase, StepRunner,
    TransactionIntent, UpgradeError,
};
