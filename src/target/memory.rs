// In-memory target system - deterministic stand-in for the deployed contracts
//
// Backs the unit and integration tests, and `run --state-file` rehearsals
// against a JSON snapshot of the system.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{check_arity, function_name, Call, Read, Receipt, Role, TargetError, TargetSystem, Value};

/// State change applied when a call lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Set a property, keyed by its read label
    Set { property: String, value: Value },
    /// Make a property read revert (or stop reverting)
    SetReverting { property: String, reverting: bool },
    /// The dictator advances its own step pointer
    AdvancePointer,
    /// The call reverts and nothing else is applied
    Revert { reason: String },
}

/// Serializable picture of the target system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step_pointer: u64,
    #[serde(default)]
    pub addresses: BTreeMap<Role, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub reverting: BTreeSet<String>,
    #[serde(default)]
    pub balances: BTreeMap<String, u128>,
    #[serde(default)]
    pub block_timestamps: BTreeMap<String, u64>,
    /// Effects keyed by call label, e.g. `SystemDictatorProxy.step3`
    #[serde(default)]
    pub effects: BTreeMap<String, Vec<Effect>>,
}

impl Snapshot {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write state file {}", path.as_ref().display()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTarget {
    state: Mutex<Snapshot>,
    submitted: Mutex<Vec<Call>>,
    reads: AtomicUsize,
    pointer_reads: AtomicUsize,
}

impl InMemoryTarget {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            ..Default::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_pointer(self, pointer: u64) -> Self {
        self.state().step_pointer = pointer;
        self
    }

    pub fn with_address(self, role: &str, address: &str) -> Self {
        self.state()
            .addresses
            .insert(Role::new(role), address.to_ascii_lowercase());
        self
    }

    pub fn with_property(self, read: &Read, value: Value) -> Self {
        self.set_property(read, value);
        self
    }

    pub fn with_effects(self, call_label: &str, effects: Vec<Effect>) -> Self {
        self.state().effects.insert(call_label.to_string(), effects);
        self
    }

    pub fn with_balance(self, address: &str, amount: u128) -> Self {
        self.state()
            .balances
            .insert(address.to_ascii_lowercase(), amount);
        self
    }

    pub fn with_block_timestamp(self, tag: &str, timestamp: u64) -> Self {
        self.state()
            .block_timestamps
            .insert(tag.to_string(), timestamp);
        self
    }

    pub fn set_property(&self, read: &Read, value: Value) {
        self.state().properties.insert(read.label(), value);
    }

    pub fn set_reverting(&self, read: &Read, reverting: bool) {
        let label = read.label();
        let mut state = self.state();
        if reverting {
            state.reverting.insert(label);
        } else {
            state.reverting.remove(&label);
        }
    }

    pub fn set_pointer(&self, pointer: u64) {
        self.state().step_pointer = pointer;
    }

    /// Land a call that was executed out-of-band by another authority
    pub fn execute_external(&self, call: &Call) -> Result<(), TargetError> {
        self.apply(call)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    /// Calls submitted through [`TargetSystem::submit`]
    pub fn submitted(&self) -> Vec<Call> {
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn pointer_read_count(&self) -> usize {
        self.pointer_reads.load(Ordering::SeqCst)
    }

    fn apply(&self, call: &Call) -> Result<(), TargetError> {
        check_arity(call)?;
        let mut state = self.state();
        let effects = state.effects.get(&call.label()).cloned().unwrap_or_default();

        if let Some(reason) = effects.iter().find_map(|e| match e {
            Effect::Revert { reason } => Some(reason.clone()),
            _ => None,
        }) {
            return Err(TargetError::SubmitFailed {
                function: call.function.clone(),
                reason,
            });
        }

        for effect in effects {
            match effect {
                Effect::Set { property, value } => {
                    state.properties.insert(property, value);
                }
                Effect::SetReverting {
                    property,
                    reverting,
                } => {
                    if reverting {
                        state.reverting.insert(property);
                    } else {
                        state.reverting.remove(&property);
                    }
                }
                Effect::AdvancePointer => state.step_pointer += 1,
                Effect::Revert { .. } => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TargetSystem for InMemoryTarget {
    fn address_of(&self, role: &Role) -> Result<String, TargetError> {
        self.state()
            .addresses
            .get(role)
            .cloned()
            .ok_or_else(|| TargetError::UnknownRole {
                role: role.to_string(),
            })
    }

    async fn step_pointer(&self) -> Result<u64, TargetError> {
        self.pointer_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state().step_pointer)
    }

    async fn read(&self, read: &Read) -> Result<Value, TargetError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let label = read.label();
        let state = self.state();

        if state.reverting.contains(&label) {
            return Err(TargetError::Reverted {
                function: read.function.clone(),
                reason: "execution reverted".to_string(),
            });
        }

        state
            .properties
            .get(&label)
            .cloned()
            .ok_or_else(|| TargetError::Unreadable {
                property: label,
                reason: "no value recorded".to_string(),
            })
    }

    async fn balance(&self, address: &str) -> Result<u128, TargetError> {
        Ok(self
            .state()
            .balances
            .get(&address.to_ascii_lowercase())
            .copied()
            .unwrap_or(0))
    }

    async fn block_timestamp(&self, tag: &str) -> Result<u64, TargetError> {
        self.state()
            .block_timestamps
            .get(tag)
            .copied()
            .ok_or_else(|| TargetError::Unreadable {
                property: format!("block {tag}"),
                reason: "unknown block tag".to_string(),
            })
    }

    async fn submit(&self, call: &Call) -> Result<Receipt, TargetError> {
        self.apply(call)?;
        let mut submitted = self
            .submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        submitted.push(call.clone());
        Ok(Receipt {
            tx_hash: format!("0x{:064x}", submitted.len()),
            block_number: None,
        })
    }

    async fn encode(&self, call: &Call) -> Result<Vec<u8>, TargetError> {
        check_arity(call)?;
        let args = call
            .args
            .iter()
            .map(Value::to_arg)
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{}({})", function_name(&call.function), args).into_bytes())
    }
}
