// Unsigned transactions handed to a manual signer

use serde::Serialize;

use super::errors::UpgradeError;
use crate::target::{Call, Role, TargetSystem};

/// A pending mutation the caller cannot sign, with its hand-off form.
///
/// Never persisted: whether it landed is decided by re-reading the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionIntent {
    pub target: Role,
    pub to: String,
    pub function: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub value: u128,
    /// JSON for the external signer, `{to, data, value, ...}`
    pub serialized: String,
}

#[derive(Serialize)]
struct UnsignedTransaction<'a> {
    to: &'a str,
    data: String,
    value: String,
    function: &'a str,
    target: &'a str,
}

impl TransactionIntent {
    pub fn data_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.payload))
    }
}

/// Encode `call` for out-of-band execution. Purely local: resolves the
/// role's address and asks the target's encoder for calldata.
pub async fn build_intent(target: &dyn TargetSystem, call: &Call) -> Result<TransactionIntent, UpgradeError> {
    let encoding_error = |reason: String| UpgradeError::Encoding {
        function: call.function.clone(),
        reason,
    };

    let to = target
        .address_of(&call.role)
        .map_err(|e| encoding_error(e.to_string()))?;
    let payload = target
        .encode(call)
        .await
        .map_err(|e| encoding_error(e.to_string()))?;

    let unsigned = UnsignedTransaction {
        to: &to,
        data: format!("0x{}", hex::encode(&payload)),
        value: call.value.to_string(),
        function: &call.function,
        target: call.role.as_str(),
    };
    let serialized =
        serde_json::to_string_pretty(&unsigned).map_err(|e| encoding_error(e.to_string()))?;

    Ok(TransactionIntent {
        target: call.role.clone(),
        to,
        function: call.function.clone(),
        payload,
        value: call.value,
        serialized,
    })
}
