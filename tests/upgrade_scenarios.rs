// End-to-end runs of the orchestrator against the in-memory deployment

mod common;

use bridge_upgrade::target::memory::Effect;
use bridge_upgrade::target::roles;
use bridge_upgrade::upgrade::assertion::Check;
use bridge_upgrade::upgrade::events::RecordingSink;
use bridge_upgrade::upgrade::plan::{self, LEGACY_NAMES};
use bridge_upgrade::upgrade::sequencer::Halt;
use bridge_upgrade::upgrade::step::{Expectation, ManualWait};
use bridge_upgrade::upgrade::{ConditionPoller, PollConfig, UpgradeEvent};
use bridge_upgrade::{
    Authority, Call, InMemoryTarget, Sequencer, Step, StepOutcome, StepPhase, StepRunner, TargetSystem, UpgradeError,
    Value,
};
use common::*;

fn poller() -> ConditionPoller {
    ConditionPoller::new(PollConfig::default())
}

async fn bridge_plan(authority: Authority, target: &InMemoryTarget) -> Sequencer {
    plan::build(&config(), authority, target).await.unwrap()
}

fn plan_step<'a>(plan: &'a Sequencer, label: &str) -> &'a Step {
    plan.steps().iter().find(|s| s.label == label).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_controller_clears_legacy_entries() {
    let cleared = &LEGACY_NAMES[..5];
    let mut effects: Vec<Effect> = cleared
        .iter()
        .map(|name| Effect::Set {
            property: plan::legacy_entry(name).label(),
            value: Value::zero_address(),
        })
        .collect();
    effects.push(Effect::AdvancePointer);

    let mut target = InMemoryTarget::default()
        .with_pointer(3)
        .with_address(roles::SYSTEM_DICTATOR, DICTATOR)
        .with_effects("SystemDictatorProxy.step3", effects);
    for name in cleared {
        target = target.with_property(&plan::legacy_entry(name), address("0x0000000000000000000000000000000000001111"));
    }

    let step = Step::numbered(3, "Clear legacy entries")
        .irreversible("You WILL NOT be able to restart the legacy system.")
        .checks(
            cleared
                .iter()
                .map(|name| Check::equals(plan::legacy_entry(name), Value::zero_address())),
        );
    let sink = RecordingSink::new();

    let outcome = StepRunner::new(&target, Authority::Controller, poller(), &sink)
        .run(&step)
        .await;

    assert_eq!(outcome, StepOutcome::Done);
    for name in cleared {
        assert_eq!(
            target.read(&plan::legacy_entry(name)).await.unwrap(),
            Value::zero_address()
        );
    }
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, UpgradeEvent::IrreversibleWarning { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_manual_ownership_transfer_resumes() {
    let admin = address("0x0000000000000000000000000000000000000ABC");
    let transfer_manager = Call::new(roles::ADDRESS_MANAGER, "transferOwnership(address)").arg(admin.clone());
    let transfer_bridge = Call::new(roles::L1_STANDARD_BRIDGE, "setOwner(address)").arg(admin.clone());

    let target = InMemoryTarget::default()
        .with_pointer(4)
        .with_address(roles::ADDRESS_MANAGER, ADDRESS_MANAGER)
        .with_address(roles::L1_STANDARD_BRIDGE, BRIDGE)
        .with_property(&address_manager_owner(), address(DICTATOR))
        .with_property(&bridge_owner(), address(DICTATOR))
        .with_effects(
            "Lib_AddressManager.transferOwnership",
            vec![Effect::Set {
                property: address_manager_owner().label(),
                value: admin.clone(),
            }],
        )
        .with_effects(
            "Proxy__BVM_L1StandardBridge.setOwner",
            vec![Effect::Set {
                property: bridge_owner().label(),
                value: admin.clone(),
            }],
        );

    let step = Step::numbered(4, "Transfer ownership to the ProxyAdmin")
        .manual_calls(vec![transfer_manager.clone(), transfer_bridge.clone()])
        .converges_when(vec![
            Expectation::new(address_manager_owner(), admin.clone()),
            Expectation::new(bridge_owner(), admin.clone()),
        ])
        .check(Check::equals(address_manager_owner(), admin.clone()))
        .check(Check::equals(bridge_owner(), admin));
    let sequencer = Sequencer::new("ownership", &["phase2"], vec![step]);

    let first_sink = RecordingSink::new();
    let first = sequencer
        .run(&StepRunner::new(&target, Authority::Manual, poller(), &first_sink))
        .await;

    match &first.halt {
        Some(Halt::AwaitingExternal { step, intents }) => {
            assert_eq!(step, "step 4");
            assert_eq!(intents.len(), 2);
            assert_eq!(intents[0].to, ADDRESS_MANAGER);
            assert_eq!(intents[1].to, BRIDGE);
        }
        other => panic!("expected awaiting external, got {other:?}"),
    }
    assert!(target.submitted().is_empty());

    target.execute_external(&transfer_manager).unwrap();
    target.execute_external(&transfer_bridge).unwrap();

    let second_sink = RecordingSink::new();
    let second = sequencer
        .run(&StepRunner::new(&target, Authority::Manual, poller(), &second_sink))
        .await;

    assert!(second.is_complete());
    assert_eq!(second.phase_of("step 4"), Some(StepPhase::Done));
    assert!(second_sink.intents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_controller_sets_dynamic_config() {
    let target = bridge_target(5);
    let plan = bridge_plan(Authority::Controller, &target).await;
    let sink = RecordingSink::new();

    let outcome = StepRunner::new(&target, Authority::Controller, poller(), &sink)
        .run(plan_step(&plan, "dynamic config"))
        .await;

    assert_eq!(outcome, StepOutcome::Done);
    assert_eq!(
        target.read(&plan::dynamic_config_set()).await.unwrap(),
        Value::Bool(true)
    );
    let submitted = target.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].args[1], Value::Bool(false));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_manual_prints_call_then_times_out() {
    let target = bridge_target(5);
    let plan = bridge_plan(Authority::Manual, &target).await;
    let step = plan_step(&plan, "dynamic config");
    assert_eq!(step.manual_wait, ManualWait::Poll);
    let sink = RecordingSink::new();

    let outcome = StepRunner::new(&target, Authority::Manual, poller(), &sink)
        .run(step)
        .await;

    match outcome {
        StepOutcome::Failed {
            error: UpgradeError::ConvergenceTimeout { elapsed_ms, .. },
        } => assert!((30_000..=31_000).contains(&elapsed_ms)),
        other => panic!("expected convergence timeout, got {other:?}"),
    }

    let intents = sink.intents();
    assert_eq!(intents.len(), 1);
    let json: serde_json::Value = serde_json::from_str(&intents[0].serialized).unwrap();
    assert_eq!(json["to"], DICTATOR);
    assert_eq!(json["function"], "updateDynamicConfig((uint256,uint256),bool)");
    assert!(target.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_full_controller_rehearsal_then_rerun_makes_no_writes() {
    let target = bridge_target(3);
    let plan = bridge_plan(Authority::Controller, &target).await;
    let sink = RecordingSink::new();
    let runner = StepRunner::new(&target, Authority::Controller, poller(), &sink);

    let report = plan.run(&runner).await;

    assert!(report.is_complete(), "halted: {:?}", report.halt);
    assert_eq!(report.phase_of("step 3"), Some(StepPhase::Done));
    assert_eq!(report.phase_of("dynamic config"), Some(StepPhase::Done));
    assert_eq!(report.phase_of("step 5"), Some(StepPhase::Done));
    // Initialized unpaused for the controller: only verified, with a warning
    assert_eq!(report.phase_of("unpause portal"), Some(StepPhase::Done));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        UpgradeEvent::Guidance { step, text }
            if step == "unpause portal" && text.contains("MantlePortal configured to not be paused")
    )));
    assert_eq!(report.phase_of("finalize"), Some(StepPhase::Done));
    let submissions = target.submitted().len();
    assert_eq!(submissions, 5);
    assert!(submissions_exclude(&target, "unpause()"));

    let rerun = plan.run(&runner).await;
    assert!(rerun.is_complete());
    // Only the final step is still at the frontier and gets re-verified
    for step in &rerun.steps[..rerun.steps.len() - 1] {
        assert_eq!(step.phase, StepPhase::Skipped, "{}", step.label);
    }
    assert_eq!(rerun.phase_of("finalize"), Some(StepPhase::Done));
    assert_eq!(target.submitted().len(), submissions);
}

fn submissions_exclude(target: &InMemoryTarget, function: &str) -> bool {
    target.submitted().iter().all(|call| call.function != function)
}

#[tokio::test(start_paused = true)]
async fn test_step_above_pointer_halts_without_writes() {
    let target = bridge_target(2);
    let plan = bridge_plan(Authority::Controller, &target).await;
    let sink = RecordingSink::new();

    let report = plan
        .run(&StepRunner::new(&target, Authority::Controller, poller(), &sink))
        .await;

    assert_eq!(
        report.halt,
        Some(Halt::NotReached {
            step: "step 3".to_string()
        })
    );
    assert_eq!(report.steps.len(), 1);
    assert!(target.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_runs_emit_identical_intents() {
    let target = bridge_target(3);
    let plan = bridge_plan(Authority::Manual, &target).await;

    let mut serialized = Vec::new();
    for _ in 0..2 {
        let sink = RecordingSink::new();
        let report = plan
            .run(&StepRunner::new(&target, Authority::Manual, poller(), &sink))
            .await;
        assert!(matches!(report.halt, Some(Halt::AwaitingExternal { .. })));
        serialized.push(
            sink.intents()
                .into_iter()
                .map(|i| i.serialized)
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(serialized[0], serialized[1]);
    assert_eq!(serialized[0].len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_progress_across_invocations() {
    let target = bridge_target(3);
    let plan = bridge_plan(Authority::Manual, &target).await;
    let sink = RecordingSink::new();
    let runner = StepRunner::new(&target, Authority::Manual, poller(), &sink);

    let first = plan.run(&runner).await;
    assert!(matches!(first.halt, Some(Halt::AwaitingExternal { ref step, .. }) if step == "step 3"));

    target
        .execute_external(&Call::new(roles::SYSTEM_DICTATOR, "step3()"))
        .unwrap();

    let second = plan.run(&runner).await;
    // Landed out-of-band, so its post-conditions are checked on this run
    assert_eq!(second.phase_of("step 3"), Some(StepPhase::Done));
    assert!(matches!(second.halt, Some(Halt::AwaitingExternal { ref step, .. }) if step == "step 4"));

    target
        .execute_external(&Call::new(roles::SYSTEM_DICTATOR, "step4()"))
        .unwrap();

    let third = plan.run(&runner).await;
    assert_eq!(third.phase_of("step 3"), Some(StepPhase::Skipped));
    assert_eq!(third.phase_of("step 4"), Some(StepPhase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_manual_step_landed_without_its_effects_fails_verification() {
    // step4() advances the pointer but leaves ownership with the dictator
    let target = bridge_target(4).with_effects("SystemDictatorProxy.step4", vec![Effect::AdvancePointer]);
    let plan = bridge_plan(Authority::Manual, &target).await;
    let sink = RecordingSink::new();
    let runner = StepRunner::new(&target, Authority::Manual, poller(), &sink);

    let first = plan.run(&runner).await;
    assert!(matches!(first.halt, Some(Halt::AwaitingExternal { ref step, .. }) if step == "step 4"));

    target
        .execute_external(&Call::new(roles::SYSTEM_DICTATOR, "step4()"))
        .unwrap();
    let intents_before = sink.intents().len();

    let second = plan.run(&runner).await;

    assert_eq!(second.phase_of("step 4"), Some(StepPhase::Failed));
    assert_eq!(second.phase_of("dynamic config"), None);
    assert_eq!(
        second.into_result().unwrap_err(),
        UpgradeError::AssertionFailed {
            property: "Lib_AddressManager.owner()".to_string(),
            expected: PROXY_ADMIN.to_string(),
            actual: DICTATOR.to_ascii_lowercase(),
        }
    );
    assert_eq!(sink.intents().len(), intents_before);
}

#[tokio::test(start_paused = true)]
async fn test_manual_rehearsal_from_dynamic_config_to_finalize() {
    let target = multisig_bridge_target(5);
    let plan = bridge_plan(Authority::Manual, &target).await;
    let sink = RecordingSink::new();
    let runner = StepRunner::new(&target, Authority::Manual, poller(), &sink);
    let last_intent = |sink: &RecordingSink| sink.intents().pop().unwrap();

    // The multisig does not act while the dynamic config call is polled for
    let err = plan.run(&runner).await.into_result().unwrap_err();
    assert!(err.is_resumable());
    let dynamic_config = last_intent(&sink);
    assert_eq!(dynamic_config.to, DICTATOR);
    assert_eq!(dynamic_config.function, "updateDynamicConfig((uint256,uint256),bool)");
    let call = plan_step(&plan, "dynamic config").manual[0].clone();
    assert_eq!(call.args[1], Value::Bool(true));
    target.execute_external(&call).unwrap();

    let second = plan.run(&runner).await;
    assert_eq!(second.phase_of("dynamic config"), Some(StepPhase::Done));
    assert!(matches!(second.halt, Some(Halt::AwaitingExternal { ref step, .. }) if step == "step 5"));
    assert_eq!(last_intent(&sink).function, "step5()");
    target
        .execute_external(&Call::new(roles::SYSTEM_DICTATOR, "step5()"))
        .unwrap();

    // Step 5 is verified with the portal still paused, then the guardian is asked to unpause
    let third = plan.run(&runner).await;
    assert_eq!(third.phase_of("dynamic config"), Some(StepPhase::Skipped));
    assert_eq!(third.phase_of("step 5"), Some(StepPhase::Done));
    assert_eq!(third.phase_of("unpause portal"), Some(StepPhase::Failed));
    let unpause = last_intent(&sink);
    assert_eq!(unpause.to, PORTAL);
    assert_eq!(unpause.function, "unpause()");
    target
        .execute_external(&Call::new(roles::PORTAL, "unpause()"))
        .unwrap();

    let fourth = plan.run(&runner).await;
    assert_eq!(fourth.phase_of("step 5"), Some(StepPhase::Skipped));
    assert_eq!(fourth.phase_of("unpause portal"), Some(StepPhase::Done));
    assert_eq!(fourth.phase_of("finalize"), Some(StepPhase::Failed));
    assert_eq!(last_intent(&sink).function, "finalize()");
    target
        .execute_external(&Call::new(roles::SYSTEM_DICTATOR, "finalize()"))
        .unwrap();

    let intents_before = sink.intents().len();
    let fifth = plan.run(&runner).await;
    assert!(fifth.is_complete(), "halted: {:?}", fifth.halt);
    assert_eq!(fifth.phase_of("unpause portal"), Some(StepPhase::Skipped));
    assert_eq!(fifth.phase_of("finalize"), Some(StepPhase::Done));
    assert_eq!(sink.intents().len(), intents_before);
    assert_eq!(target.read(&proxy_admin_owner()).await.unwrap(), address(FINAL_OWNER));
    assert!(target.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_post_condition_reports_both_values() {
    // step 3 lands but leaves one legacy entry behind
    let target = bridge_target(3).with_effects(
        "SystemDictatorProxy.step3",
        vec![Effect::AdvancePointer],
    );
    let plan = bridge_plan(Authority::Controller, &target).await;
    let sink = RecordingSink::new();

    let err = plan
        .run(&StepRunner::new(&target, Authority::Controller, poller(), &sink))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(
        err,
        UpgradeError::AssertionFailed {
            property: "Lib_AddressManager.getAddress(BVM_CanonicalTransactionChain)".to_string(),
            expected: bridge_upgrade::target::ZERO_ADDRESS.to_string(),
            actual: "0x0000000000000000000000000000000000001111".to_string(),
        }
    );
}
