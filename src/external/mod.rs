//! External tool abstractions
//!
//! Trait-based access to the command-line tools the orchestrator drives, so
//! the chain client can be tested without a node.

pub mod cast;
pub mod command;

pub use cast::{CastClient, CastError};
pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
