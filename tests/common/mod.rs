// Shared fixture: an in-memory bridge deployment whose dictator calls have
// the effects the real contracts would have
#![allow(dead_code)]

use bridge_upgrade::config::UpgradeConfig;
use bridge_upgrade::target::memory::Effect;
use bridge_upgrade::target::roles;
use bridge_upgrade::upgrade::plan::{self, LEGACY_NAMES};
use bridge_upgrade::{InMemoryTarget, Read, Value, ValueKind};

pub const CONTROLLER: &str = "0x00000000000000000000000000000000000000C0";
pub const MULTISIG: &str = "0x00000000000000000000000000000000000000F5";
pub const FINAL_OWNER: &str = "0x00000000000000000000000000000000000000f0";
pub const DICTATOR: &str = "0x00000000000000000000000000000000000000d1";
pub const PROXY_ADMIN: &str = "0x0000000000000000000000000000000000000abc";
pub const ADDRESS_MANAGER: &str = "0x00000000000000000000000000000000000000a0";
pub const MESSENGER: &str = "0x00000000000000000000000000000000000000e1";
pub const BRIDGE: &str = "0x00000000000000000000000000000000000000b1";
pub const ORACLE: &str = "0x00000000000000000000000000000000000000a2";
pub const PORTAL: &str = "0x00000000000000000000000000000000000000a3";
pub const FACTORY: &str = "0x00000000000000000000000000000000000000a4";
pub const ERC721_BRIDGE: &str = "0x00000000000000000000000000000000000000a5";

pub const STARTING_BLOCK: u64 = 100;
pub const STARTING_TIMESTAMP: i64 = 1_700_000_000;

pub fn address(raw: &str) -> Value {
    Value::address(raw).unwrap()
}

pub fn config() -> UpgradeConfig {
    UpgradeConfig {
        controller: CONTROLLER.to_string(),
        final_system_owner: FINAL_OWNER.to_string(),
        l2_output_oracle_starting_block_number: STARTING_BLOCK,
        l2_output_oracle_starting_timestamp: STARTING_TIMESTAMP,
        ..UpgradeConfig::default()
    }
}

pub fn config_toml() -> String {
    format!(
        r#"controller = "{CONTROLLER}"
final_system_owner = "{FINAL_OWNER}"
l2_output_oracle_starting_block_number = {STARTING_BLOCK}
l2_output_oracle_starting_timestamp = {STARTING_TIMESTAMP}

[polling]
timeout_ms = 2000
interval_ms = 100
"#
    )
}

pub fn address_manager_owner() -> Read {
    Read::new(roles::ADDRESS_MANAGER, "owner()", ValueKind::Address)
}

pub fn bridge_owner() -> Read {
    Read::new(roles::L1_STANDARD_BRIDGE, "getOwner()", ValueKind::Address)
}

fn set(read: &Read, value: Value) -> Effect {
    Effect::Set {
        property: read.label(),
        value,
    }
}

/// Deployment sitting at `pointer`, with legacy state still in place. Step 5
/// initializes the portal unpaused, as the controller configures it.
pub fn bridge_target(pointer: u64) -> InMemoryTarget {
    deployment(pointer, false)
}

/// Same deployment, but step 5 leaves the portal paused for the guardian
pub fn multisig_bridge_target(pointer: u64) -> InMemoryTarget {
    deployment(pointer, true)
}

pub fn proxy_admin_owner() -> Read {
    Read::new(roles::PROXY_ADMIN, "owner()", ValueKind::Address)
}

fn deployment(pointer: u64, paused_after_init: bool) -> InMemoryTarget {
    let params = |field| Read::new(roles::PORTAL, "params()", ValueKind::Uint).field(field);
    let messenger_of = |role| Read::new(role, "messenger()", ValueKind::Address);
    let proxy_admin_owner = proxy_admin_owner();

    let mut target = InMemoryTarget::default()
        .with_pointer(pointer)
        .with_address(roles::SYSTEM_DICTATOR, DICTATOR)
        .with_address(roles::PROXY_ADMIN, PROXY_ADMIN)
        .with_address(roles::ADDRESS_MANAGER, ADDRESS_MANAGER)
        .with_address(roles::L1_CROSS_DOMAIN_MESSENGER, MESSENGER)
        .with_address(roles::L1_STANDARD_BRIDGE, BRIDGE)
        .with_address(roles::L2_OUTPUT_ORACLE, ORACLE)
        .with_address(roles::PORTAL, PORTAL)
        .with_address(roles::ERC20_FACTORY, FACTORY)
        .with_address(roles::L1_ERC721_BRIDGE, ERC721_BRIDGE)
        .with_property(&address_manager_owner(), address(DICTATOR))
        .with_property(&bridge_owner(), address(DICTATOR))
        .with_property(&plan::dynamic_config_set(), Value::Bool(false))
        .with_property(&plan::portal_paused(), Value::Bool(true))
        .with_property(&plan::finalized(), Value::Bool(false))
        .with_property(&proxy_admin_owner, address(DICTATOR))
        .with_property(
            &Read::new(roles::PORTAL, "INITIAL_BASE_FEE()", ValueKind::Uint),
            Value::Uint(1_000_000_000),
        );

    for name in LEGACY_NAMES {
        target = target.with_property(&plan::legacy_entry(name), address("0x0000000000000000000000000000000000001111"));
    }

    let mut step3: Vec<Effect> = LEGACY_NAMES
        .iter()
        .map(|name| set(&plan::legacy_entry(name), Value::zero_address()))
        .collect();
    step3.push(Effect::AdvancePointer);

    // Earlier steps have already left their mark
    if pointer > 3 {
        for name in LEGACY_NAMES {
            target = target.with_property(&plan::legacy_entry(name), Value::zero_address());
        }
    }
    if pointer > 4 {
        target = target
            .with_property(&address_manager_owner(), address(PROXY_ADMIN))
            .with_property(&bridge_owner(), address(PROXY_ADMIN));
    }

    target
        .with_effects("SystemDictatorProxy.step3", step3)
        .with_effects(
            "SystemDictatorProxy.step4",
            vec![
                set(&address_manager_owner(), address(PROXY_ADMIN)),
                set(&bridge_owner(), address(PROXY_ADMIN)),
                Effect::AdvancePointer,
            ],
        )
        .with_effects(
            "SystemDictatorProxy.updateDynamicConfig",
            vec![set(&plan::dynamic_config_set(), Value::Bool(true))],
        )
        .with_effects(
            "SystemDictatorProxy.step5",
            vec![
                set(
                    &Read::new(roles::L2_OUTPUT_ORACLE, "latestBlockNumber()", ValueKind::Uint),
                    Value::Uint(STARTING_BLOCK as u128),
                ),
                set(
                    &Read::new(roles::PORTAL, "l2Sender()", ValueKind::Address),
                    address("0x000000000000000000000000000000000000dEaD"),
                ),
                set(&params(0), Value::Uint(1_000_000_000)),
                set(&params(1), Value::Uint(0)),
                set(&params(2), Value::Uint(17)),
                set(&plan::portal_paused(), Value::Bool(paused_after_init)),
                Effect::SetReverting {
                    property: Read::new(
                        roles::L1_CROSS_DOMAIN_MESSENGER,
                        "xDomainMessageSender()",
                        ValueKind::Address,
                    )
                    .label(),
                    reverting: true,
                },
                set(&messenger_of(roles::L1_STANDARD_BRIDGE), address(MESSENGER)),
                set(&messenger_of(roles::L1_ERC721_BRIDGE), address(MESSENGER)),
                set(
                    &Read::new(roles::ERC20_FACTORY, "BRIDGE()", ValueKind::Address),
                    address(BRIDGE),
                ),
                Effect::AdvancePointer,
            ],
        )
        .with_effects(
            "MantlePortalProxy.unpause",
            vec![set(&plan::portal_paused(), Value::Bool(false))],
        )
        .with_effects(
            "SystemDictatorProxy.finalize",
            vec![
                set(&plan::finalized(), Value::Bool(true)),
                set(&proxy_admin_owner, address(FINAL_OWNER)),
            ],
        )
}
