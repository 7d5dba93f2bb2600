//! Phase 2: issue each descriptor's configuration calls.
//!
//! Every module exists by the time wiring runs, so wiring references may
//! point anywhere, cycles included. A stage is validated as a whole before
//! its first call: missing handles and repeated calls are caller errors and
//! never reach the backend.

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::interfaces::{CallArg, LedgerBackend};
use crate::module_set::ModuleSet;
use crate::registry::WiringArg;
use crate::types::{ModuleId, TableKind, WiringStage};

/// A resolved call, ready to be issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedCall {
    pub module: ModuleId,
    pub method: &'static str,
    pub args: Vec<CallArg>,
}

/// Table each stage configures, and the table it may reference.
fn stage_tables(stage: WiringStage) -> (TableKind, Option<TableKind>) {
    match stage {
        WiringStage::Core => (TableKind::Core, Some(TableKind::Auxiliary)),
        WiringStage::Auxiliary => (TableKind::Auxiliary, None),
        WiringStage::Bridge => (TableKind::Auxiliary, Some(TableKind::Core)),
    }
}

fn resolve(
    module: ModuleId,
    method: &'static str,
    arg: &WiringArg,
    target: &ModuleSet,
    other: Option<&ModuleSet>,
) -> Result<CallArg, DeployError> {
    match arg {
        WiringArg::MaxWord => Ok(CallArg::MAX_WORD),
        WiringArg::Module(dependency) => target
            .address(*dependency)
            .or_else(|| other.and_then(|set| set.address(*dependency)))
            .map(CallArg::Address)
            .ok_or(DeployError::MissingDependency {
                module,
                method: method.to_string(),
                dependency: *dependency,
            }),
    }
}

/// Resolve every call of `stage`, in table order, without touching the backend.
pub(crate) fn plan_stage(
    stage: WiringStage,
    target: &ModuleSet,
    other: Option<&ModuleSet>,
) -> Result<Vec<PlannedCall>, DeployError> {
    let (target_kind, other_kind) = stage_tables(stage);
    target.expect_kind(target_kind)?;
    if let (Some(set), Some(kind)) = (other, other_kind) {
        set.expect_kind(kind)?;
    }

    let mut planned = Vec::new();
    for descriptor in target.table().descriptors() {
        for call in descriptor.wiring.iter().filter(|c| c.stage == stage) {
            if !target.contains(descriptor.id) {
                return Err(DeployError::MissingDependency {
                    module: descriptor.id,
                    method: call.method.to_string(),
                    dependency: descriptor.id,
                });
            }
            if target.is_wired(descriptor.id, call.method) {
                return Err(DeployError::AlreadyWired {
                    module: descriptor.id,
                    method: call.method.to_string(),
                });
            }
            let args = call
                .args
                .iter()
                .map(|arg| resolve(descriptor.id, call.method, arg, target, other))
                .collect::<Result<Vec<_>, _>>()?;
            planned.push(PlannedCall {
                module: descriptor.id,
                method: call.method,
                args,
            });
        }
    }
    Ok(planned)
}

/// Issue every call of `stage` against `target`.
///
/// Calls go out one at a time and are recorded as soon as they succeed. The
/// first failure stops the stage; nothing is retried. Returns the number of
/// calls issued.
pub(crate) fn connect_stage(
    backend: &mut dyn LedgerBackend,
    stage: WiringStage,
    target: &mut ModuleSet,
    other: Option<&ModuleSet>,
) -> Result<usize, DeployError> {
    let planned = plan_stage(stage, target, other)?;
    info!(stage = %stage, calls = planned.len(), "wiring modules");

    for call in &planned {
        let address = target
            .address(call.module)
            .ok_or(DeployError::NotFound(call.module))?;
        backend
            .invoke(address, call.method, &call.args)
            .map_err(|source| DeployError::InvocationFailed {
                module: call.module,
                method: call.method.to_string(),
                source,
            })?;
        target.mark_wired(call.module, call.method);
        debug!(module = %call.module, method = call.method, args = call.args.len(), "wired");
    }

    Ok(planned.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Fault, MemoryLedger};
    use crate::deployment::deploy_table;
    use crate::interfaces::LedgerEvent;
    use crate::registry::DescriptorTable;
    use crate::types::{Address, ExternalAddresses};

    fn deploy_both(ledger: &mut MemoryLedger) -> (ModuleSet, ModuleSet) {
        let externals = ExternalAddresses {
            bounty: Address::new([1; 20]),
            lp_rewards: Address::new([2; 20]),
            multisig: Address::new([3; 20]),
        };
        let core = deploy_table(ledger, DescriptorTable::core(), None).expect("core");
        let aux =
            deploy_table(ledger, DescriptorTable::auxiliary(), Some(&externals)).expect("aux");
        (core, aux)
    }

    #[test]
    fn test_core_stage_issues_calls_in_table_order() {
        let mut ledger = MemoryLedger::new();
        let (mut core, aux) = deploy_both(&mut ledger);
        let issued = connect_stage(&mut ledger, WiringStage::Core, &mut core, Some(&aux))
            .expect("wire");
        assert_eq!(issued, 10);

        let methods: Vec<_> = ledger
            .invocations()
            .filter_map(|event| match event {
                LedgerEvent::Invoke { target, method, .. } => {
                    Some((ledger.artifact_at(*target).map(str::to_string), method.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(methods[0], (Some("SortedTroves".into()), "setParams".into()));
        assert_eq!(methods[1], (Some("TroveManager".into()), "setAddresses".into()));
        assert_eq!(
            methods[6],
            (Some("FunctionCaller".into()), "setTroveManagerAddress".into())
        );
    }

    #[test]
    fn test_sorted_troves_gets_unbounded_size() {
        let mut ledger = MemoryLedger::new();
        let (core, aux) = deploy_both(&mut ledger);
        let planned = plan_stage(WiringStage::Core, &core, Some(&aux)).expect("plan");
        assert_eq!(planned[0].module, ModuleId::SortedTroves);
        assert_eq!(planned[0].args[0], CallArg::MAX_WORD);
    }

    #[test]
    fn test_core_stage_needs_governance_modules() {
        let mut ledger = MemoryLedger::new();
        let (mut core, _aux) = deploy_both(&mut ledger);
        let err = connect_stage(&mut ledger, WiringStage::Core, &mut core, None).unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingDependency {
                module: ModuleId::TroveManager,
                dependency: ModuleId::BlpyToken,
                ..
            }
        ));
        assert_eq!(ledger.invoke_attempts(), 0);
    }

    #[test]
    fn test_bridge_twice_is_rejected_without_backend_call() {
        let mut ledger = MemoryLedger::new();
        let (core, mut aux) = deploy_both(&mut ledger);
        connect_stage(&mut ledger, WiringStage::Bridge, &mut aux, Some(&core)).expect("bridge");
        let attempts = ledger.invoke_attempts();
        let err =
            connect_stage(&mut ledger, WiringStage::Bridge, &mut aux, Some(&core)).unwrap_err();
        assert!(matches!(err, DeployError::AlreadyWired { .. }));
        assert_eq!(ledger.invoke_attempts(), attempts);
    }

    #[test]
    fn test_swapped_sets_rejected() {
        let mut ledger = MemoryLedger::new();
        let (core, mut aux) = deploy_both(&mut ledger);
        let err =
            connect_stage(&mut ledger, WiringStage::Core, &mut aux, Some(&core)).unwrap_err();
        assert!(matches!(err, DeployError::TableMismatch { .. }));
    }

    #[test]
    fn test_failure_stops_the_stage() {
        let mut ledger = MemoryLedger::new().with_fault(Fault::Invoke { nth: 3 });
        let (mut core, aux) = deploy_both(&mut ledger);
        let err =
            connect_stage(&mut ledger, WiringStage::Core, &mut core, Some(&aux)).unwrap_err();
        match err {
            DeployError::InvocationFailed { module, method, .. } => {
                assert_eq!(module, ModuleId::ActivePool);
                assert_eq!(method, "setAddresses");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ledger.invoke_attempts(), 3);
        assert_eq!(core.wired_calls(), 2);
    }
}
