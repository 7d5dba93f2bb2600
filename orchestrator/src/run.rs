//! # Deployment Run
//!
//! One run owns one backend and drives the protocol through
//!
//! ```text
//! Idle -> Constructing -> Wired -> [Proxied] -> Ready
//! ```
//!
//! Any fatal error moves the run to `Failed`, which is terminal. Caller
//! mistakes (repeated wiring, repeated wrapping, missing handles) are
//! rejected without touching the state.
//!
//! Every set a run builds carries the run's id, and a run refuses to wire or
//! wrap sets stamped by any other run.

use serde::Serialize;
use tracing::{error, info};

use crate::deployment;
use crate::errors::DeployError;
use crate::interfaces::LedgerBackend;
use crate::module_set::{AuxiliaryModuleSet, CoreModuleSet, ModuleSet};
use crate::proxy::{self, UserProxies};
use crate::registry::DescriptorTable;
use crate::types::{Address, ExternalAddresses, RunId, Variant, WiringStage};
use crate::unipool::{self, Unipool};
use crate::wiring;

/// Lifecycle of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Constructing,
    Wired,
    Proxied,
    Ready,
    Failed,
}

const CONSTRUCTION: &[RunState] = &[RunState::Idle, RunState::Constructing];
const WIRING: &[RunState] = &[RunState::Constructing, RunState::Wired];
const WRAPPING: &[RunState] = &[RunState::Wired, RunState::Proxied];

/// User proxy parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOptions {
    pub owner: Address,
    pub users: Vec<Address>,
}

/// Liquidity mining parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnipoolOptions {
    pub pair: Address,
    pub duration: u64,
}

/// Everything [`DeploymentRun::deploy_protocol`] needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub variant: Variant,
    pub externals: ExternalAddresses,
    pub proxies: Option<ProxyOptions>,
    pub unipool: Option<UnipoolOptions>,
}

/// Result of a full pipeline
#[derive(Debug)]
pub struct Deployment {
    pub core: CoreModuleSet,
    pub auxiliary: AuxiliaryModuleSet,
    pub unipool: Option<Unipool>,
    pub proxies: Option<UserProxies>,
}

/// Single linear deployment pipeline over one backend.
#[derive(Debug)]
pub struct DeploymentRun<B: LedgerBackend> {
    id: RunId,
    backend: B,
    state: RunState,
    failure: Option<String>,
}

impl<B: LedgerBackend> DeploymentRun<B> {
    pub fn new(backend: B) -> Self {
        let id = RunId::next();
        info!(run = %id, backend = backend.name(), "deployment run created");
        Self {
            id,
            backend,
            state: RunState::Idle,
            failure: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Message of the error that failed the run.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn begin(&self, operation: &'static str, allowed: &[RunState]) -> Result<(), DeployError> {
        if self.state == RunState::Failed {
            return Err(DeployError::RunFailed(
                self.failure.clone().unwrap_or_default(),
            ));
        }
        if !allowed.contains(&self.state) {
            return Err(DeployError::InvalidTransition {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn settle<T>(
        &mut self,
        result: Result<T, DeployError>,
        next: RunState,
    ) -> Result<T, DeployError> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(err) => {
                if err.is_fatal() {
                    error!(code = err.code(), error = %err, "deployment run failed");
                    self.failure = Some(err.to_string());
                    self.state = RunState::Failed;
                }
                Err(err)
            }
        }
    }

    // ---- Phase 1 ----

    /// Construct any descriptor table.
    pub fn deploy_table(
        &mut self,
        table: DescriptorTable,
        externals: Option<&ExternalAddresses>,
    ) -> Result<ModuleSet, DeployError> {
        self.begin("deploy", CONSTRUCTION)?;
        let id = self.id;
        let result = deployment::deploy_table(&mut self.backend, table, externals).map(|mut set| {
            set.stamp(id);
            set
        });
        self.settle(result, RunState::Constructing)
    }

    pub fn deploy_core(&mut self, variant: Variant) -> Result<CoreModuleSet, DeployError> {
        self.deploy_table(DescriptorTable::core().select(variant), None)
    }

    pub fn deploy_auxiliary(
        &mut self,
        variant: Variant,
        bounty: Address,
        lp_rewards: Address,
        multisig: Address,
    ) -> Result<AuxiliaryModuleSet, DeployError> {
        let externals = ExternalAddresses {
            bounty,
            lp_rewards,
            multisig,
        };
        self.deploy_table(DescriptorTable::auxiliary().select(variant), Some(&externals))
    }

    pub fn deploy_unipool(&mut self) -> Result<Unipool, DeployError> {
        self.begin("deploy_unipool", CONSTRUCTION)?;
        let id = self.id;
        let result = unipool::deploy_unipool(&mut self.backend).map(|mut pool| {
            pool.stamp(id);
            pool
        });
        self.settle(result, RunState::Constructing)
    }

    // ---- Phase 2 ----

    fn connect(
        &mut self,
        operation: &'static str,
        stage: WiringStage,
        target: &mut ModuleSet,
        other: Option<&ModuleSet>,
    ) -> Result<usize, DeployError> {
        self.begin(operation, WIRING)?;
        target.expect_run(self.id)?;
        if let Some(other) = other {
            other.expect_run(self.id)?;
        }
        let result = wiring::connect_stage(&mut self.backend, stage, target, other);
        self.settle(result, RunState::Wired)
    }

    /// Wire the core modules, including their governance token references.
    pub fn connect_core(
        &mut self,
        core: &mut CoreModuleSet,
        aux: &AuxiliaryModuleSet,
    ) -> Result<usize, DeployError> {
        self.connect("connect_core", WiringStage::Core, core, Some(aux))
    }

    pub fn connect_auxiliary(&mut self, aux: &mut AuxiliaryModuleSet) -> Result<usize, DeployError> {
        self.connect("connect_auxiliary", WiringStage::Auxiliary, aux, None)
    }

    pub fn connect_auxiliary_to_core(
        &mut self,
        aux: &mut AuxiliaryModuleSet,
        core: &CoreModuleSet,
    ) -> Result<usize, DeployError> {
        self.connect("connect_auxiliary_to_core", WiringStage::Bridge, aux, Some(core))
    }

    pub fn connect_unipool(
        &mut self,
        pool: &mut Unipool,
        aux: &AuxiliaryModuleSet,
        pair: Address,
        duration: u64,
    ) -> Result<(), DeployError> {
        self.begin("connect_unipool", WIRING)?;
        pool.expect_run(self.id)?;
        aux.expect_run(self.id)?;
        let result = unipool::connect_unipool(&mut self.backend, pool, aux, pair, duration);
        self.settle(result, RunState::Wired)
    }

    // ---- Proxies ----

    pub fn wrap_with_proxies(
        &mut self,
        core: &mut CoreModuleSet,
        aux: &mut AuxiliaryModuleSet,
        owner: Address,
        users: &[Address],
    ) -> Result<UserProxies, DeployError> {
        self.begin("wrap_with_proxies", WRAPPING)?;
        core.expect_run(self.id)?;
        aux.expect_run(self.id)?;
        let result = proxy::wrap_with_proxies(&mut self.backend, core, aux, owner, users);
        self.settle(result, RunState::Proxied)
    }

    pub fn finish(&mut self) -> Result<RunState, DeployError> {
        self.begin("finish", WRAPPING)?;
        self.state = RunState::Ready;
        info!(backend = self.backend.name(), "deployment ready");
        Ok(self.state)
    }

    /// Whole protocol in one go: both tables, every wiring stage, optional
    /// liquidity mining and proxies.
    pub fn deploy_protocol(&mut self, options: &PipelineOptions) -> Result<Deployment, DeployError> {
        let externals = options.externals;
        info!(variant = %options.variant, "Phase 1: constructing modules");
        let mut core = self.deploy_core(options.variant)?;
        let mut auxiliary = self.deploy_auxiliary(
            options.variant,
            externals.bounty,
            externals.lp_rewards,
            externals.multisig,
        )?;
        let mut pool = match options.unipool {
            Some(_) => Some(self.deploy_unipool()?),
            None => None,
        };

        info!("Phase 2: wiring modules");
        self.connect_core(&mut core, &auxiliary)?;
        self.connect_auxiliary(&mut auxiliary)?;
        self.connect_auxiliary_to_core(&mut auxiliary, &core)?;
        if let (Some(pool), Some(params)) = (pool.as_mut(), options.unipool) {
            self.connect_unipool(pool, &auxiliary, params.pair, params.duration)?;
        }

        let proxies = match &options.proxies {
            Some(proxy) => {
                info!("Phase 3: wrapping user proxies");
                Some(self.wrap_with_proxies(&mut core, &mut auxiliary, proxy.owner, &proxy.users)?)
            }
            None => None,
        };

        self.finish()?;
        Ok(Deployment {
            core,
            auxiliary,
            unipool: pool,
            proxies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Fault, MemoryLedger, PlanLedger};
    use crate::types::ModuleId;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            variant: Variant::Production,
            externals: ExternalAddresses {
                bounty: address(0xb1),
                lp_rewards: address(0xb2),
                multisig: address(0xb3),
            },
            proxies: None,
            unipool: None,
        }
    }

    #[test]
    fn test_state_progression() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        assert_eq!(run.state(), RunState::Idle);
        let mut core = run.deploy_core(Variant::Production).expect("core");
        assert_eq!(run.state(), RunState::Constructing);
        let mut aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        run.connect_core(&mut core, &aux).expect("core wiring");
        assert_eq!(run.state(), RunState::Wired);
        run.connect_auxiliary(&mut aux).expect("aux wiring");
        run.connect_auxiliary_to_core(&mut aux, &core).expect("bridge");
        assert_eq!(run.finish().expect("finish"), RunState::Ready);
    }

    #[test]
    fn test_no_construction_after_wiring() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let mut core = run.deploy_core(Variant::Production).expect("core");
        let aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        run.connect_core(&mut core, &aux).expect("wire");
        let err = run.deploy_core(Variant::Production).unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidTransition {
                state: RunState::Wired,
                ..
            }
        ));
        assert_eq!(run.state(), RunState::Wired);
    }

    #[test]
    fn test_finish_requires_wiring() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        assert!(matches!(
            run.finish(),
            Err(DeployError::InvalidTransition {
                operation: "finish",
                state: RunState::Idle
            })
        ));
    }

    #[test]
    fn test_caller_error_keeps_run_alive() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let core = run.deploy_core(Variant::Production).expect("core");
        let mut aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        run.connect_auxiliary_to_core(&mut aux, &core).expect("bridge");
        let err = run.connect_auxiliary_to_core(&mut aux, &core).unwrap_err();
        assert!(matches!(err, DeployError::AlreadyWired { .. }));
        assert_eq!(run.state(), RunState::Wired);
    }

    #[test]
    fn test_backend_failure_is_terminal() {
        let mut run = DeploymentRun::new(MemoryLedger::new().with_fault(Fault::Invoke { nth: 1 }));
        let err = run.deploy_protocol(&options()).unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvocationFailed {
                module: ModuleId::SortedTroves,
                ..
            }
        ));
        assert_eq!(run.state(), RunState::Failed);
        assert!(run.failure().is_some());
        assert!(matches!(run.finish(), Err(DeployError::RunFailed(_))));
    }

    #[test]
    fn test_construction_failure_is_terminal() {
        let mut run = DeploymentRun::new(
            MemoryLedger::new().with_fault(Fault::Construct { artifact: "USBToken".into() }),
        );
        let mut aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        assert_eq!(run.state(), RunState::Constructing);

        let err = run.deploy_core(Variant::Production).unwrap_err();
        assert!(matches!(
            err,
            DeployError::ConstructionFailed {
                module: ModuleId::UsbToken,
                ..
            }
        ));
        assert_eq!(run.state(), RunState::Failed);
        assert!(matches!(
            run.connect_auxiliary(&mut aux),
            Err(DeployError::RunFailed(_))
        ));
        assert!(matches!(run.deploy_unipool(), Err(DeployError::RunFailed(_))));
        assert_eq!(run.backend().invoke_attempts(), 0);
    }

    #[test]
    fn test_wrapping_failure_is_terminal() {
        let mut run = DeploymentRun::new(
            MemoryLedger::new().with_fault(Fault::Construct { artifact: "TokenScript".into() }),
        );
        let mut core = run.deploy_core(Variant::Production).expect("core");
        let mut aux = run
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        run.connect_core(&mut core, &aux).expect("core wiring");
        run.connect_auxiliary(&mut aux).expect("aux wiring");
        run.connect_auxiliary_to_core(&mut aux, &core).expect("bridge");
        let attempts = run.backend().invoke_attempts();

        let err = run
            .wrap_with_proxies(&mut core, &mut aux, address(0xee), &[address(4)])
            .unwrap_err();
        assert!(matches!(err, DeployError::ConstructionFailed { .. }));
        assert_eq!(run.state(), RunState::Failed);
        assert!(matches!(run.finish(), Err(DeployError::RunFailed(_))));
        assert!(matches!(
            run.connect_auxiliary(&mut aux),
            Err(DeployError::RunFailed(_))
        ));
        assert_eq!(run.backend().invoke_attempts(), attempts);
    }

    #[test]
    fn test_sets_from_another_run_rejected() {
        let mut memory = DeploymentRun::new(MemoryLedger::new());
        let mut core = memory.deploy_core(Variant::Production).expect("core");
        let aux = memory
            .deploy_auxiliary(Variant::Production, address(1), address(2), address(3))
            .expect("aux");
        assert_eq!(core.run_id(), Some(memory.id()));

        let mut plan = DeploymentRun::new(PlanLedger::new());
        assert_ne!(plan.id(), memory.id());
        let mut pool = plan.deploy_unipool().expect("pool");
        assert_eq!(plan.state(), RunState::Constructing);

        let err = plan.connect_core(&mut core, &aux).unwrap_err();
        assert!(matches!(err, DeployError::ForeignModuleSet(_)));
        assert_eq!(err.code(), 602);
        assert!(matches!(
            plan.connect_unipool(&mut pool, &aux, address(0x77), 60),
            Err(DeployError::ForeignModuleSet(_))
        ));
        assert!(!pool.is_configured());
        assert_eq!(plan.state(), RunState::Constructing);
        assert_eq!(core.wired_calls(), 0);

        let plan = plan.into_backend().into_plan();
        assert_eq!(plan.constructions(), 1);
        assert_eq!(plan.invocations(), 0);

        // the owning run can still wire them
        assert_eq!(memory.connect_core(&mut core, &aux).expect("core wiring"), 10);
    }

    #[test]
    fn test_full_pipeline_with_extras() {
        let mut run = DeploymentRun::new(MemoryLedger::new());
        let mut opts = options();
        opts.proxies = Some(ProxyOptions {
            owner: address(0xee),
            users: vec![address(1), address(2)],
        });
        opts.unipool = Some(UnipoolOptions {
            pair: address(0x77),
            duration: 86_400,
        });
        let deployment = run.deploy_protocol(&opts).expect("deploy");
        assert_eq!(run.state(), RunState::Ready);
        assert!(deployment.unipool.as_ref().is_some_and(Unipool::is_configured));
        assert_eq!(deployment.proxies.as_ref().map(UserProxies::len), Some(2));
        assert!(deployment.core.is_proxied(ModuleId::BorrowerWrappers));
        assert!(deployment.auxiliary.is_proxied(ModuleId::BlpyStaking));
    }
}
