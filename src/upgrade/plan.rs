// The bridge upgrade as a concrete step list
//
// Phase two of the system dictator migration: clear the legacy address
// manager, hand ownership to the ProxyAdmin, configure and initialize the
// new contracts, unpause the portal and finalize.

use tracing::{info, warn};

use super::assertion::Check;
use super::errors::UpgradeError;
use super::sequencer::Sequencer;
use super::step::{Authority, Step};
use crate::config::UpgradeConfig;
use crate::target::{roles, Call, Read, Role, TargetSystem, Value, ValueKind};

pub const PLAN_NAME: &str = "SystemDictatorSteps";
pub const PLAN_TAGS: &[&str] = &["SystemDictatorSteps", "phase2"];

/// L2 sender value of an initialized portal
pub const DEFAULT_L2_SENDER: &str = "0x000000000000000000000000000000000000dEaD";

/// AddressManager entries that step 3 clears
pub const LEGACY_NAMES: &[&str] = &[
    "BVM_CanonicalTransactionChain",
    "BVM_L2CrossDomainMessenger",
    "BVM_DecompressionPrecompileAddress",
    "BVM_Sequencer",
    "BVM_Proposer",
    "BVM_ChainStorageContainer-CTC-batches",
    "BVM_ChainStorageContainer-CTC-queue",
    "BVM_StateCommitmentChain",
    "BVM_BondManager",
    "BVM_ExecutionManager",
    "BVM_FraudVerifier",
    "BVM_StateManagerFactory",
    "BVM_StateTransitionerFactory",
    "BVM_SafetyChecker",
    "BVM_L1MultiMessageRelayer",
    "BondManager",
];

const STEP_3_WARNING: &str = "
    Step 3 will clear out some legacy state from the AddressManager. Once you execute this step,
    you WILL NOT BE ABLE TO RESTART THE SYSTEM using exit1(). You should confirm that the L2
    system is entirely operational before executing this step.
";

const STEP_4_GUIDANCE: &str = "
    Step 4 will transfer ownership of the AddressManager and L1StandardBridge to the ProxyAdmin.
";

const DYNAMIC_CONFIG_GUIDANCE: &str = "
    You must now set the dynamic L2OutputOracle configuration by calling the function
    updateL2OutputOracleDynamicConfig. You will need to provide the
    l2OutputOracleStartingBlockNumber and the l2OutputOracleStartingTimestamp which can both be
    found by querying the last finalized block in the L2 node.
";

const STEP_5_GUIDANCE: &str = "
    Step 5 will initialize all Bedrock contracts. After this step is executed, the MantlePortal
    will be open for deposits but withdrawals will be paused if deploying a production network.
    The Proposer will also be able to submit L2 outputs to the L2OutputOracle.
";

const UNPAUSE_GUIDANCE: &str = "
    Unpause the MantlePortal. The GUARDIAN account should be used. In practice
    this is the multisig. In test networks, the MantlePortal is initialized
    without being paused.
";

const FINALIZE_GUIDANCE: &str = "
    You must now finalize the upgrade by calling finalize() on the SystemDictator. This will
    transfer ownership of the ProxyAdmin to the final system owner as specified in the deployment
    configuration.
";

pub fn legacy_entry(name: &str) -> Read {
    Read::new(roles::ADDRESS_MANAGER, "getAddress(string)", ValueKind::Address).arg(name)
}

pub fn dynamic_config_set() -> Read {
    Read::new(roles::SYSTEM_DICTATOR, "dynamicConfigSet()", ValueKind::Bool)
}

pub fn portal_paused() -> Read {
    Read::new(roles::PORTAL, "paused()", ValueKind::Bool)
}

pub fn finalized() -> Read {
    Read::new(roles::SYSTEM_DICTATOR, "finalized()", ValueKind::Bool)
}

/// Values the plan needs from configuration and the deployed system
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInputs {
    pub proxy_admin: Value,
    pub messenger: Value,
    pub bridge: Value,
    pub final_owner: Value,
    pub starting_block: u64,
    pub starting_timestamp: u64,
}

impl PlanInputs {
    /// Resolve role addresses through the target, so a missing deployment
    /// fails before the first step rather than halfway through a run
    pub async fn resolve(config: &UpgradeConfig, target: &dyn TargetSystem) -> Result<Self, UpgradeError> {
        let resolve = |role: &str| -> Result<Value, UpgradeError> {
            let address = target
                .address_of(&Role::new(role))
                .map_err(|e| UpgradeError::Config {
                    reason: e.to_string(),
                })?;
            parse_address(&address, role)
        };

        Ok(Self {
            proxy_admin: resolve(roles::PROXY_ADMIN)?,
            messenger: resolve(roles::L1_CROSS_DOMAIN_MESSENGER)?,
            bridge: resolve(roles::L1_STANDARD_BRIDGE)?,
            final_owner: parse_address(&config.final_system_owner, "final_system_owner")?,
            starting_block: config.l2_output_oracle_starting_block_number,
            starting_timestamp: starting_timestamp(config, target).await?,
        })
    }

    /// Zero addresses everywhere; enough to list the steps offline
    pub fn placeholder(config: &UpgradeConfig) -> Self {
        Self {
            proxy_admin: Value::zero_address(),
            messenger: Value::zero_address(),
            bridge: Value::zero_address(),
            final_owner: Value::zero_address(),
            starting_block: config.l2_output_oracle_starting_block_number,
            starting_timestamp: u64::try_from(config.l2_output_oracle_starting_timestamp).unwrap_or(0),
        }
    }
}

/// The complete phase-two sequence for `authority`
pub async fn build(
    config: &UpgradeConfig,
    authority: Authority,
    target: &dyn TargetSystem,
) -> Result<Sequencer, UpgradeError> {
    let inputs = PlanInputs::resolve(config, target).await?;
    let plan = assemble(&inputs, authority);
    info!(authority = ?authority, steps = plan.steps().len(), "Built upgrade plan");
    Ok(plan)
}

pub fn assemble(inputs: &PlanInputs, authority: Authority) -> Sequencer {
    let steps = vec![
        step_3(),
        step_4(inputs.proxy_admin.clone()),
        dynamic_config(inputs.starting_block, inputs.starting_timestamp),
        step_5(inputs, authority),
        unpause_portal(authority),
        finalize(inputs.final_owner.clone()),
    ];
    Sequencer::new(PLAN_NAME, PLAN_TAGS, steps)
}

/// Configured starting timestamp, or the L1 starting block's own timestamp when negative
pub async fn starting_timestamp(config: &UpgradeConfig, target: &dyn TargetSystem) -> Result<u64, UpgradeError> {
    match u64::try_from(config.l2_output_oracle_starting_timestamp) {
        Ok(timestamp) => Ok(timestamp),
        Err(_) => {
            warn!(
                tag = %config.l1_starting_block_tag,
                "Starting timestamp is unset; using the L1 starting block's timestamp"
            );
            target
                .block_timestamp(&config.l1_starting_block_tag)
                .await
                .map_err(UpgradeError::Read)
        }
    }
}

fn parse_address(raw: &str, name: &str) -> Result<Value, UpgradeError> {
    Value::address(raw).map_err(|e| UpgradeError::Config {
        reason: format!("{name}: {e}"),
    })
}

fn step_3() -> Step {
    Step::numbered(3, "Clear legacy AddressManager entries")
        .irreversible(STEP_3_WARNING)
        .checks(
            LEGACY_NAMES
                .iter()
                .map(|name| Check::equals(legacy_entry(name), Value::zero_address())),
        )
}

fn step_4(proxy_admin: Value) -> Step {
    Step::numbered(4, STEP_4_GUIDANCE)
        .check(Check::equals(
            Read::new(roles::ADDRESS_MANAGER, "owner()", ValueKind::Address),
            proxy_admin.clone(),
        ))
        .check(Check::equals(
            Read::new(roles::L1_STANDARD_BRIDGE, "getOwner()", ValueKind::Address),
            proxy_admin,
        ))
}

fn update_dynamic_config(block: u64, timestamp: u64, pause_portal: bool) -> Call {
    Call::new(roles::SYSTEM_DICTATOR, "updateDynamicConfig((uint256,uint256),bool)")
        .arg(Value::Tuple(vec![Value::from(block), Value::from(timestamp)]))
        .arg(pause_portal)
}

fn dynamic_config(block: u64, timestamp: u64) -> Step {
    Step::flagged("dynamic config", 5, dynamic_config_set(), true, DYNAMIC_CONFIG_GUIDANCE)
        .controller_call(update_dynamic_config(block, timestamp, false))
        // The multisig keeps the portal paused until the guardian unpauses it
        .manual_calls(vec![update_dynamic_config(block, timestamp, true)])
}

fn step_5(inputs: &PlanInputs, authority: Authority) -> Step {
    let params = |field| Read::new(roles::PORTAL, "params()", ValueKind::Uint).field(field);
    let messenger_of = |role| Read::new(role, "messenger()", ValueKind::Address);

    Step::numbered(5, STEP_5_GUIDANCE).checks([
        Check::equals(
            Read::new(roles::L2_OUTPUT_ORACLE, "latestBlockNumber()", ValueKind::Uint),
            Value::from(inputs.starting_block),
        ),
        Check::equals(
            Read::new(roles::PORTAL, "l2Sender()", ValueKind::Address),
            Value::Address(DEFAULT_L2_SENDER.to_ascii_lowercase()),
        ),
        Check::matches_read(
            params(0),
            Read::new(roles::PORTAL, "INITIAL_BASE_FEE()", ValueKind::Uint),
        ),
        Check::equals(params(1), Value::Uint(0)),
        Check::not_equals(params(2), Value::Uint(0)),
        Check::balance(roles::L1_STANDARD_BRIDGE, 0),
        Check::equals(portal_paused(), Value::Bool(authority == Authority::Manual)),
        Check::reverts(Read::new(
            roles::L1_CROSS_DOMAIN_MESSENGER,
            "xDomainMessageSender()",
            ValueKind::Address,
        )),
        Check::equals(messenger_of(roles::L1_STANDARD_BRIDGE), inputs.messenger.clone()),
        Check::equals(
            Read::new(roles::ERC20_FACTORY, "BRIDGE()", ValueKind::Address),
            inputs.bridge.clone(),
        ),
        Check::equals(messenger_of(roles::L1_ERC721_BRIDGE), inputs.messenger.clone()),
    ])
}

fn unpause_portal(authority: Authority) -> Step {
    let mut guidance = UNPAUSE_GUIDANCE.to_string();
    if authority == Authority::Controller {
        guidance.push_str(
            "\nWARNING: MantlePortal configured to not be paused\nThis should only happen for test environments\n",
        );
    }

    Step::flagged("unpause portal", 6, portal_paused(), false, &guidance)
        .manual_calls(vec![Call::new(roles::PORTAL, "unpause()")])
        .check(Check::equals(portal_paused(), Value::Bool(false)))
}

fn finalize(final_owner: Value) -> Step {
    Step::flagged("finalize", 6, finalized(), true, FINALIZE_GUIDANCE)
        .controller_call(Call::new(roles::SYSTEM_DICTATOR, "finalize()"))
        .manual_calls(vec![Call::new(roles::SYSTEM_DICTATOR, "finalize()")])
        .check(Check::equals(
            Read::new(roles::PROXY_ADMIN, "owner()", ValueKind::Address),
            final_owner,
        ))
}
