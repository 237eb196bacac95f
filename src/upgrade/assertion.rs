// Post-condition checks: read a property once and compare it

use serde::Serialize;
use tracing::debug;

use super::errors::UpgradeError;
use crate::target::{Read, Role, TargetError, TargetSystem, Value};

/// A single post-condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    Equals { read: Read, expected: Value },
    NotEquals { read: Read, unexpected: Value },
    /// Two properties of the target must agree, e.g. a parameter and its initial constant
    MatchesRead { read: Read, reference: Read },
    BalanceEquals { role: Role, expected: u128 },
    /// The read must revert
    Reverts { read: Read },
}

impl Check {
    pub fn equals(read: Read, expected: Value) -> Self {
        Check::Equals { read, expected }
    }

    pub fn not_equals(read: Read, unexpected: Value) -> Self {
        Check::NotEquals { read, unexpected }
    }

    pub fn matches_read(read: Read, reference: Read) -> Self {
        Check::MatchesRead { read, reference }
    }

    pub fn balance(role: &str, expected: u128) -> Self {
        Check::BalanceEquals {
            role: Role::new(role),
            expected,
        }
    }

    pub fn reverts(read: Read) -> Self {
        Check::Reverts { read }
    }

    /// Name of the property under check
    pub fn property(&self) -> String {
        match self {
            Check::Equals { read, .. }
            | Check::NotEquals { read, .. }
            | Check::MatchesRead { read, .. }
            | Check::Reverts { read } => read.label(),
            Check::BalanceEquals { role, .. } => format!("balance({role})"),
        }
    }
}

/// Read `read` once and require it to equal `expected`
pub async fn assert_equals(
    target: &dyn TargetSystem,
    read: &Read,
    expected: &Value,
) -> Result<(), UpgradeError> {
    let actual = target.read(read).await.map_err(UpgradeError::Read)?;
    if &actual == expected {
        debug!(property = %read.label(), value = %actual, "Property matches");
        Ok(())
    } else {
        Err(UpgradeError::assertion(read.label(), expected, actual))
    }
}

pub async fn verify(target: &dyn TargetSystem, check: &Check) -> Result<(), UpgradeError> {
    match check {
        Check::Equals { read, expected } => assert_equals(target, read, expected).await,
        Check::NotEquals { read, unexpected } => {
            let actual = target.read(read).await.map_err(UpgradeError::Read)?;
            if &actual == unexpected {
                Err(UpgradeError::assertion(
                    read.label(),
                    format!("anything but {unexpected}"),
                    actual,
                ))
            } else {
                Ok(())
            }
        }
        Check::MatchesRead { read, reference } => {
            let expected = target.read(reference).await.map_err(UpgradeError::Read)?;
            assert_equals(target, read, &expected).await
        }
        Check::BalanceEquals { role, expected } => {
            let address = target.address_of(role).map_err(UpgradeError::Read)?;
            let actual = target.balance(&address).await.map_err(UpgradeError::Read)?;
            if actual == *expected {
                Ok(())
            } else {
                Err(UpgradeError::assertion(check.property(), expected, actual))
            }
        }
        Check::Reverts { read } => match target.read(read).await {
            Err(TargetError::Reverted { .. }) => Ok(()),
            Ok(actual) => Err(UpgradeError::assertion(read.label(), "revert", actual)),
            Err(other) => Err(UpgradeError::Read(other)),
        },
    }
}
