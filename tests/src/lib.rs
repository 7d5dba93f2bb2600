//! blocPay Orchestrator Integration Tests
//!
//! End-to-end runs against the in-memory ledger and the planner.

#[cfg(test)]
mod pipeline_tests {
    use std::collections::{BTreeMap, BTreeSet};

    use blocpay_orchestrator::*;
    use pretty_assertions::assert_eq;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn externals() -> ExternalAddresses {
        ExternalAddresses {
            bounty: address(0xb1),
            lp_rewards: address(0xb2),
            multisig: address(0xb3),
        }
    }

    fn options(variant: Variant) -> PipelineOptions {
        PipelineOptions {
            variant,
            externals: externals(),
            proxies: None,
            unipool: None,
        }
    }

    fn deploy(variant: Variant) -> (Deployment, MemoryLedger) {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let deployment = run.deploy_protocol(&options(variant)).expect("deploy");
        (deployment, run.into_backend())
    }

    /// Sequence number at which each address was constructed.
    fn construction_seqs(events: &[LedgerEvent]) -> BTreeMap<Address, u64> {
        events
            .iter()
            .filter_map(|event| match event {
                LedgerEvent::Construct { seq, address, .. } => Some((*address, *seq)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_every_identity_has_a_handle() {
        let (deployment, _) = deploy(Variant::Production);
        for id in DescriptorTable::core().ids() {
            assert!(deployment.core.handle(id).is_some(), "{id} missing");
        }
        for id in DescriptorTable::auxiliary().ids() {
            assert!(deployment.auxiliary.handle(id).is_some(), "{id} missing");
        }
    }

    #[test]
    fn test_wiring_never_references_later_modules() {
        let (_, ledger) = deploy(Variant::Production);
        let constructed = construction_seqs(ledger.events());
        let mut checked = 0;
        for event in ledger.invocations() {
            if let LedgerEvent::Invoke { seq, target, args, .. } = event {
                let target_seq = constructed.get(target).expect("target constructed");
                assert!(target_seq < seq);
                for referenced in args.iter().flat_map(CallArg::addresses) {
                    let at = constructed.get(&referenced).expect("argument constructed");
                    assert!(at < seq, "{referenced} used before construction");
                    checked += 1;
                }
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_debt_token_constructed_after_its_dependencies() {
        let (deployment, ledger) = deploy(Variant::Production);
        let constructed = construction_seqs(ledger.events());
        let seq_of = |id: ModuleId| {
            let handle = deployment.core.handle(id).expect("handle");
            constructed[&handle.address()]
        };
        let token = seq_of(ModuleId::UsbToken);
        for dependency in [
            ModuleId::TroveManager,
            ModuleId::StabilityPool,
            ModuleId::BorrowerOperations,
        ] {
            assert!(seq_of(dependency) < token, "{dependency} built after USBToken");
        }
    }

    #[test]
    fn test_bridging_twice_fails() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let core = run.deploy_core(Variant::Production).expect("core");
        let mut aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        assert_eq!(run.connect_auxiliary_to_core(&mut aux, &core).expect("bridge"), 2);

        let invoked = run.backend().invocations().count();
        let err = run.connect_auxiliary_to_core(&mut aux, &core).unwrap_err();
        assert!(matches!(err, DeployError::AlreadyWired { .. }));
        assert_eq!(err.code(), 401);
        assert_eq!(run.backend().invocations().count(), invoked);
    }

    fn shape(set: &ModuleSet) -> Vec<(ModuleId, Vec<(&'static str, usize)>)> {
        set.table()
            .descriptors()
            .iter()
            .map(|d| {
                (
                    d.id,
                    d.wiring.iter().map(|call| (call.method, call.args.len())).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_tester_variant_has_identical_shape() {
        let (production, production_ledger) = deploy(Variant::Production);
        let (tester, tester_ledger) = deploy(Variant::Tester);

        let ids = |set: &ModuleSet| set.ids().collect::<BTreeSet<_>>();
        assert_eq!(ids(&production.core), ids(&tester.core));
        assert_eq!(ids(&production.auxiliary), ids(&tester.auxiliary));
        assert_eq!(shape(&production.core), shape(&tester.core));
        assert_eq!(shape(&production.auxiliary), shape(&tester.auxiliary));

        let arg_counts = |ledger: &MemoryLedger| {
            ledger
                .invocations()
                .filter_map(|event| match event {
                    LedgerEvent::Invoke { method, args, .. } => Some((method.clone(), args.len())),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(arg_counts(&production_ledger), arg_counts(&tester_ledger));

        let manager = tester.core.handle(ModuleId::TroveManager).expect("handle");
        assert_eq!(manager.artifact(), "TroveManagerTester");
        let feed = tester.core.handle(ModuleId::PriceFeedTestnet).expect("handle");
        assert_eq!(feed.artifact(), "PriceFeedTestnet");
    }

    #[test]
    fn test_three_users_share_one_script() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let mut opts = options(Variant::Production);
        opts.proxies = Some(ProxyOptions {
            owner: address(0xee),
            users: vec![address(1), address(2), address(3)],
        });
        let deployment = run.deploy_protocol(&opts).expect("deploy");

        let router = deployment
            .core
            .router(ModuleId::BorrowerOperations)
            .expect("router");
        let bindings: Vec<_> = router.bindings().collect();
        assert_eq!(bindings.len(), 3);
        let proxies: BTreeSet<_> = bindings.iter().map(|b| b.proxy).collect();
        assert_eq!(proxies.len(), 3);
        let script = router.script().map(ModuleHandle::address);
        assert!(script.is_some());
        assert!(bindings.iter().all(|b| b.script == script));

        // reads still go straight to the module
        let module = router.delegatee().expect("delegatee");
        assert_eq!(module.artifact(), "BorrowerOperations");
        let configured = run
            .backend()
            .query(module.address(), "setAddresses")
            .expect("query")
            .expect("configured");
        assert_eq!(configured.len(), 10);
    }

    #[test]
    fn test_fifth_invoke_failure_stops_the_run() {
        let mut run = DeploymentRun::new(MemoryLedger::new().with_fault(Fault::Invoke { nth: 5 }));
        let err = run.deploy_protocol(&options(Variant::Production)).unwrap_err();

        match &err {
            DeployError::InvocationFailed { module, method, source } => {
                assert_eq!(*module, ModuleId::DefaultPool);
                assert_eq!(method, "setAddresses");
                assert!(source.message().contains("invoke #5"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(run.backend().invoke_attempts(), 5);
        assert_eq!(run.backend().invocations().count(), 4);
        assert_eq!(run.state(), RunState::Failed);

        let mut aux = DeploymentRun::new(MemoryLedger::new())
            .deploy_table(DescriptorTable::auxiliary(), Some(&externals()))
            .expect("aux");
        assert!(matches!(
            run.connect_auxiliary(&mut aux),
            Err(DeployError::RunFailed(_))
        ));
        assert_eq!(run.backend().invoke_attempts(), 5);
    }

    #[test]
    fn test_planner_refuses_sets_built_in_memory() {
        let (mut deployment, _) = deploy(Variant::Production);
        let mut plan = DeploymentRun::new(PlanLedger::new());
        let mut core = plan.deploy_core(Variant::Production).expect("core");
        let mut aux = plan
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");

        let err = plan
            .connect_core(&mut core, &deployment.auxiliary)
            .unwrap_err();
        assert!(matches!(err, DeployError::ForeignModuleSet(_)));
        assert_eq!(
            err.to_string(),
            "auxiliary module set was built by another deployment run"
        );
        assert!(matches!(
            plan.connect_auxiliary_to_core(&mut deployment.auxiliary, &core),
            Err(DeployError::ForeignModuleSet(_))
        ));

        plan.connect_core(&mut core, &aux).expect("core wiring");
        plan.connect_auxiliary(&mut aux).expect("aux wiring");
        plan.connect_auxiliary_to_core(&mut aux, &core).expect("bridge");
        assert!(matches!(
            plan.wrap_with_proxies(&mut deployment.core, &mut aux, address(0xee), &[address(4)]),
            Err(DeployError::ForeignModuleSet(_))
        ));
        assert_eq!(plan.state(), RunState::Wired);
        assert!(!deployment.core.is_proxied(ModuleId::BorrowerWrappers));

        let steps = plan.into_backend().into_plan();
        assert_eq!(steps.constructions(), 16);
        assert_eq!(steps.invocations(), deployment.core.wired_calls() + deployment.auxiliary.wired_calls());
    }

    #[test]
    fn test_planner_records_the_same_steps() {
        let (_, memory) = deploy(Variant::Production);
        let mut run = DeploymentRun::new(PlanLedger::new());
        run.deploy_protocol(&options(Variant::Production)).expect("plan");
        let plan = run.into_backend().into_plan();

        let constructions = memory
            .events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Construct { .. }))
            .count();
        assert_eq!(plan.constructions(), constructions);
        assert_eq!(plan.invocations(), memory.invocations().count());
    }

    #[test]
    fn test_manifest_lists_both_sets() {
        let (deployment, ledger) = deploy(Variant::Production);
        let book = AddressBook::from_deployment(ledger.name(), &deployment);
        let json = book.to_json_pretty().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["core"].as_object().map(|m| m.len()), Some(12));
        assert_eq!(value["auxiliary"].as_object().map(|m| m.len()), Some(4));
        assert_eq!(
            value["auxiliary"]["BLPYToken"]["address"],
            deployment
                .auxiliary
                .address(ModuleId::BlpyToken)
                .expect("token")
                .to_string()
        );
    }
}

#[cfg(test)]
mod ordering_properties {
    use blocpay_orchestrator::ordering::{construction_levels, construction_order};
    use blocpay_orchestrator::registry::ConstructorArg;
    use blocpay_orchestrator::{DeployError, DescriptorTable, ModuleDescriptor, ModuleId, TableKind};
    use proptest::prelude::*;

    fn pool() -> Vec<ModuleId> {
        DescriptorTable::core().ids().collect()
    }

    /// Acyclic table: module `i` may only depend on modules generated before
    /// it, then the table order is shuffled.
    fn acyclic_table() -> impl Strategy<Value = Vec<ModuleDescriptor>> {
        let ids = pool();
        let n = ids.len();
        (
            prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(move |(edges, order)| {
                order
                    .into_iter()
                    .map(|i| {
                        let deps = (0..i)
                            .filter(|&j| edges[i][j])
                            .map(|j| ConstructorArg::Module(ids[j]));
                        ModuleDescriptor::new(ids[i], ids[i].name()).constructed_with(deps)
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn order_respects_every_constructor_dependency(table in acyclic_table()) {
            let order = construction_order(TableKind::Core, &table).expect("acyclic");
            prop_assert_eq!(order.len(), table.len());
            let position = |id: ModuleId| order.iter().position(|m| *m == id);
            for descriptor in &table {
                for dependency in descriptor.constructor_dependencies() {
                    prop_assert!(position(dependency) < position(descriptor.id));
                }
            }
        }

        #[test]
        fn order_is_deterministic(table in acyclic_table()) {
            let first = construction_levels(TableKind::Core, &table).expect("acyclic");
            let second = construction_levels(TableKind::Core, &table).expect("acyclic");
            prop_assert_eq!(first, second);
        }

        #[test]
        fn cycles_report_every_member(len in 1usize..8) {
            let ids = pool();
            let ring: Vec<_> = (0..len)
                .map(|i| {
                    ModuleDescriptor::new(ids[i], ids[i].name())
                        .constructed_with([ConstructorArg::Module(ids[(i + 1) % len])])
                })
                .collect();
            match construction_levels(TableKind::Core, &ring) {
                Err(DeployError::CyclicConstructorDependency { involved }) => {
                    prop_assert_eq!(involved, ids[..len].to_vec());
                }
                other => prop_assert!(false, "expected a cycle, got {:?}", other),
            }
        }
    }
}
