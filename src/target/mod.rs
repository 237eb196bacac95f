//! Target system abstractions
//!
//! The deployed system under upgrade is owned externally. The orchestrator
//! only sees it through the narrow [`TargetSystem`] trait: read the step
//! pointer, read named properties, submit a call, or encode one for a
//! manual signer. Contract resolution, signing and broadcast live behind it.

pub mod memory;
pub mod value;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use memory::{Effect, InMemoryTarget, Snapshot};
pub use value::{Value, ValueError, ValueKind, ZERO_ADDRESS};

/// Deployment names of the contracts touched by the bridge upgrade
pub mod roles {
    pub const SYSTEM_DICTATOR: &str = "SystemDictatorProxy";
    pub const PROXY_ADMIN: &str = "ProxyAdmin";
    pub const ADDRESS_MANAGER: &str = "Lib_AddressManager";
    pub const L1_CROSS_DOMAIN_MESSENGER: &str = "Proxy__BVM_L1CrossDomainMessenger";
    pub const L1_STANDARD_BRIDGE: &str = "Proxy__BVM_L1StandardBridge";
    pub const L2_OUTPUT_ORACLE: &str = "L2OutputOracleProxy";
    pub const PORTAL: &str = "MantlePortalProxy";
    pub const ERC20_FACTORY: &str = "MantleMintableERC20FactoryProxy";
    pub const L1_ERC721_BRIDGE: &str = "L1ERC721BridgeProxy";

    pub const ALL: &[&str] = &[
        SYSTEM_DICTATOR,
        PROXY_ADMIN,
        ADDRESS_MANAGER,
        L1_CROSS_DOMAIN_MESSENGER,
        L1_STANDARD_BRIDGE,
        L2_OUTPUT_ORACLE,
        PORTAL,
        ERC20_FACTORY,
        L1_ERC721_BRIDGE,
    ];
}

/// Logical name of a contract in the target system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Role::new(name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named observable property of the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    pub role: Role,
    /// Function signature without return type, e.g. `getAddress(string)`
    pub function: String,
    pub args: Vec<Value>,
    pub returns: ValueKind,
    /// Selects one output of a function returning a tuple
    pub field: Option<usize>,
}

impl Read {
    pub fn new(role: &str, function: &str, returns: ValueKind) -> Self {
        Self {
            role: Role::new(role),
            function: function.to_string(),
            args: Vec::new(),
            returns,
            field: None,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn field(mut self, index: usize) -> Self {
        self.field = Some(index);
        self
    }

    /// Human-readable property name, e.g. `Lib_AddressManager.getAddress(BVM_Sequencer)`
    pub fn label(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut label = format!("{}.{}({})", self.role, function_name(&self.function), args);
        if let Some(field) = self.field {
            label.push_str(&format!("[{field}]"));
        }
        label
    }
}

/// A mutating call against one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub role: Role,
    /// Function signature, e.g. `transferOwnership(address)`
    pub function: String,
    pub args: Vec<Value>,
    /// Native value attached to the call, in wei
    pub value: u128,
}

impl Call {
    pub fn new(role: &str, function: &str) -> Self {
        Self {
            role: Role::new(role),
            function: function.to_string(),
            args: Vec::new(),
            value: 0,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn name(&self) -> &str {
        function_name(&self.function)
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.role, self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TargetError {
    #[error("Unknown contract role: {role}")]
    UnknownRole { role: String },
    #[error("Read of {property} failed: {reason}")]
    Unreadable { property: String, reason: String },
    #[error("Call to {function} reverted: {reason}")]
    Reverted { function: String, reason: String },
    #[error("Target unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Submitting {function} failed: {reason}")]
    SubmitFailed { function: String, reason: String },
    #[error("Cannot encode {function}: {reason}")]
    Encoding { function: String, reason: String },
    #[error("Unexpected output for {property}: {source}")]
    Decode {
        property: String,
        #[source]
        source: ValueError,
    },
}

/// Narrow accessor surface of the system under upgrade
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Resolve a role to its deployed address
    fn address_of(&self, role: &Role) -> Result<String, TargetError>;

    /// Current value of the shared step pointer
    async fn step_pointer(&self) -> Result<u64, TargetError>;

    /// Read a named property
    async fn read(&self, read: &Read) -> Result<Value, TargetError>;

    /// Native balance of an address
    async fn balance(&self, address: &str) -> Result<u128, TargetError>;

    /// Timestamp of the block identified by `tag` (number or `latest`, `finalized`, ...)
    async fn block_timestamp(&self, tag: &str) -> Result<u64, TargetError>;

    /// Sign and submit a call as the controller
    async fn submit(&self, call: &Call) -> Result<Receipt, TargetError>;

    /// Encode a call into calldata without submitting it
    async fn encode(&self, call: &Call) -> Result<Vec<u8>, TargetError>;
}

/// `transferOwnership(address)` -> `transferOwnership`
pub fn function_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

/// Number of top-level parameters in a function signature
pub fn signature_arity(signature: &str) -> Option<usize> {
    let open = signature.find('(')?;
    let close = signature.rfind(')')?;
    if close < open {
        return None;
    }
    let params = &signature[open + 1..close];
    if params.trim().is_empty() {
        return Some(0);
    }

    let mut depth = 0usize;
    let mut count = 1;
    for c in params.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => count += 1,
            _ => {}
        }
    }
    Some(count)
}

/// Reject calls whose argument count does not match their signature
pub fn check_arity(call: &Call) -> Result<(), TargetError> {
    match signature_arity(&call.function) {
        Some(n) if n == call.args.len() => Ok(()),
        Some(n) => Err(TargetError::Encoding {
            function: call.function.clone(),
            reason: format!("expected {n} arguments, got {}", call.args.len()),
        }),
        None => Err(TargetError::Encoding {
            function: call.function.clone(),
            reason: "malformed function signature".to_string(),
        }),
    }
}
