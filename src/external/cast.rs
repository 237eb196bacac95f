//! Foundry `cast` chain client
//!
//! Implements [`TargetSystem`] against a live L1 by shelling out to `cast`.
//! Signing uses `ETH_PRIVATE_KEY` from the executor's environment, never an
//! argument.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::command::{CommandError, CommandExecutor};
use crate::target::{check_arity, roles, Call, Read, Receipt, Role, TargetError, TargetSystem, Value, ValueKind};

#[derive(Debug, Error)]
pub enum CastError {
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
    #[error("execution reverted: {message}")]
    Reverted { message: String },
    #[error("cast failed: {message}")]
    Failed { message: String },
    #[error("Invalid response from cast: {message}")]
    InvalidResponse { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub struct CastClient {
    executor: Arc<dyn CommandExecutor>,
    cast_path: String,
    rpc_url: String,
    addresses: BTreeMap<Role, String>,
}

impl CastClient {
    pub fn new(executor: Arc<dyn CommandExecutor>, cast_path: &str, rpc_url: &str) -> Self {
        Self {
            executor,
            cast_path: cast_path.to_string(),
            rpc_url: rpc_url.to_string(),
            addresses: BTreeMap::new(),
        }
    }

    pub fn with_addresses<'a>(mut self, addresses: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (role, address) in addresses {
            self.addresses.insert(Role::new(role), address.to_ascii_lowercase());
        }
        self
    }

    async fn execute_cast_command(&self, args: &[&str]) -> Result<String, CastError> {
        let mut full_args = args.to_vec();
        full_args.extend_from_slice(&["--rpc-url", self.rpc_url.as_str()]);
        debug!(command = %args.first().copied().unwrap_or_default(), "Running cast");

        let output = self.executor.execute(&self.cast_path, &full_args).await?;
        if !output.success() {
            return Err(classify_cast_error(&output.stderr));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Address lookups are case-insensitive on the role name
    fn lookup(&self, role: &Role) -> Option<&String> {
        self.addresses.get(role).or_else(|| {
            self.addresses
                .iter()
                .find(|(name, _)| name.as_str().eq_ignore_ascii_case(role.as_str()))
                .map(|(_, address)| address)
        })
    }
}

fn classify_cast_error(stderr: &str) -> CastError {
    let message = stderr.trim().to_string();
    if message.contains("revert") {
        CastError::Reverted { message }
    } else {
        CastError::Failed { message }
    }
}

fn render_args(args: &[Value]) -> Vec<String> {
    args.iter().map(Value::to_arg).collect()
}

/// Decode one 32-byte word of raw ABI output
fn decode_word(kind: ValueKind, raw: &str, index: usize) -> Option<Value> {
    let digits = raw.trim().strip_prefix("0x").unwrap_or(raw.trim());
    let word = digits.get(index * 64..(index + 1) * 64)?;
    match kind {
        ValueKind::Uint => {
            let (high, low) = word.split_at(32);
            if high.chars().any(|c| c != '0') {
                return None;
            }
            u128::from_str_radix(low, 16).ok().map(Value::Uint)
        }
        ValueKind::Bool => Some(Value::Bool(word.chars().any(|c| c != '0'))),
        ValueKind::Address => Value::address(&format!("0x{}", &word[24..])).ok(),
        ValueKind::Bytes => hex::decode(word).ok().map(Value::Bytes),
        ValueKind::Int | ValueKind::Str => None,
    }
}

fn parse_quantity(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => raw.split_whitespace().next()?.parse().ok(),
    }
}

fn read_error(read: &Read, err: CastError) -> TargetError {
    match err {
        CastError::Reverted { message } => TargetError::Reverted {
            function: read.function.clone(),
            reason: message,
        },
        CastError::CommandError { source } => TargetError::Unavailable {
            reason: source.to_string(),
        },
        other => TargetError::Unreadable {
            property: read.label(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl TargetSystem for CastClient {
    fn address_of(&self, role: &Role) -> Result<String, TargetError> {
        self.lookup(role)
            .cloned()
            .ok_or_else(|| TargetError::UnknownRole {
                role: role.to_string(),
            })
    }

    async fn step_pointer(&self) -> Result<u64, TargetError> {
        let read = Read::new(roles::SYSTEM_DICTATOR, "currentStep()", ValueKind::Uint);
        let value = self.read(&read).await?;
        value
            .as_uint()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| TargetError::Unreadable {
                property: read.label(),
                reason: format!("unexpected step pointer {value}"),
            })
    }

    async fn read(&self, read: &Read) -> Result<Value, TargetError> {
        let address = self.address_of(&read.role)?;
        let signature = match read.field {
            // Tuple outputs come back raw and are decoded word by word
            Some(_) => read.function.clone(),
            None => format!("{}({})", read.function, read.returns.abi_type()),
        };
        let rendered = render_args(&read.args);

        let mut args = vec!["call", address.as_str(), signature.as_str()];
        args.extend(rendered.iter().map(String::as_str));

        let output = self
            .execute_cast_command(&args)
            .await
            .map_err(|e| read_error(read, e))?;

        match read.field {
            Some(index) => decode_word(read.returns, &output, index).ok_or_else(|| TargetError::Unreadable {
                property: read.label(),
                reason: format!("cannot decode field {index} of {output}"),
            }),
            None => Value::parse(read.returns, &output).map_err(|source| TargetError::Decode {
                property: read.label(),
                source,
            }),
        }
    }

    async fn balance(&self, address: &str) -> Result<u128, TargetError> {
        let output = self
            .execute_cast_command(&["balance", address])
            .await
            .map_err(|e| TargetError::Unavailable { reason: e.to_string() })?;
        output
            .split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| TargetError::Unreadable {
                property: format!("balance({address})"),
                reason: format!("unexpected output {output:?}"),
            })
    }

    async fn block_timestamp(&self, tag: &str) -> Result<u64, TargetError> {
        let output = self
            .execute_cast_command(&["block", tag, "--field", "timestamp"])
            .await
            .map_err(|e| TargetError::Unavailable { reason: e.to_string() })?;
        parse_quantity(&output).ok_or_else(|| TargetError::Unreadable {
            property: format!("block {tag}"),
            reason: format!("unexpected timestamp {output:?}"),
        })
    }

    async fn submit(&self, call: &Call) -> Result<Receipt, TargetError> {
        check_arity(call)?;
        let address = self.address_of(&call.role)?;
        let rendered = render_args(&call.args);
        let value = call.value.to_string();

        let mut args = vec!["send", "--json", address.as_str(), call.function.as_str()];
        args.extend(rendered.iter().map(String::as_str));
        if call.value > 0 {
            args.extend_from_slice(&["--value", value.as_str()]);
        }

        let submit_error = |reason: String| TargetError::SubmitFailed {
            function: call.function.clone(),
            reason,
        };
        let output = self
            .execute_cast_command(&args)
            .await
            .map_err(|e| submit_error(e.to_string()))?;
        let receipt: SendReceipt = serde_json::from_str(&output)
            .map_err(|e| submit_error(format!("unreadable receipt: {e}")))?;

        if receipt.status.as_deref() == Some("0x0") {
            return Err(submit_error(format!("transaction {} reverted", receipt.transaction_hash)));
        }

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.as_deref().and_then(parse_quantity),
        })
    }

    async fn encode(&self, call: &Call) -> Result<Vec<u8>, TargetError> {
        check_arity(call)?;
        let rendered = render_args(&call.args);
        let mut args = vec!["calldata", call.function.as_str()];
        args.extend(rendered.iter().map(String::as_str));

        // calldata is local; no RPC involved
        let output = self
            .executor
            .execute(&self.cast_path, &args)
            .await
            .map_err(|e| TargetError::Encoding {
                function: call.function.clone(),
                reason: e.to_string(),
            })?;
        if !output.success() {
            return Err(TargetError::Encoding {
                function: call.function.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }

        let digits = output.stdout.trim();
        hex::decode(digits.strip_prefix("0x").unwrap_or(digits)).map_err(|e| TargetError::Encoding {
            function: call.function.clone(),
            reason: e.to_string(),
        })
    }
}
