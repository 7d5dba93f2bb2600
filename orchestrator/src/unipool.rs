//! Liquidity mining pool.
//!
//! Not part of either descriptor table: it is deployed on demand and then
//! pointed at the governance token and the pair it rewards.

use tracing::info;

use crate::deployment::construct_module;
use crate::errors::DeployError;
use crate::interfaces::{CallArg, LedgerBackend};
use crate::module_set::{ModuleHandle, ModuleSet};
use crate::registry::unipool_descriptor;
use crate::types::{Address, ModuleId, RunId, TableKind};

const SET_PARAMS: &str = "setParams";

/// Deployed pool and whether its parameters were set.
#[derive(Debug)]
pub struct Unipool {
    handle: ModuleHandle,
    configured: bool,
    run: Option<RunId>,
}

impl Unipool {
    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    pub fn address(&self) -> Address {
        self.handle.address()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run
    }

    pub(crate) fn stamp(&mut self, run: RunId) {
        self.run = Some(run);
    }

    pub(crate) fn expect_run(&self, run: RunId) -> Result<(), DeployError> {
        if self.run == Some(run) {
            Ok(())
        } else {
            Err(DeployError::ForeignModuleSet(ModuleId::Unipool.name().to_string()))
        }
    }
}

pub(crate) fn deploy_unipool(backend: &mut dyn LedgerBackend) -> Result<Unipool, DeployError> {
    let descriptor = unipool_descriptor();
    let handle = construct_module(backend, descriptor.id, descriptor.artifact, &[])?;
    Ok(Unipool {
        handle,
        configured: false,
        run: None,
    })
}

/// `setParams(BLPYToken, pair, duration)`, at most once per pool.
pub(crate) fn connect_unipool(
    backend: &mut dyn LedgerBackend,
    unipool: &mut Unipool,
    aux: &ModuleSet,
    pair: Address,
    duration: u64,
) -> Result<(), DeployError> {
    aux.expect_kind(TableKind::Auxiliary)?;
    if unipool.configured {
        return Err(DeployError::AlreadyWired {
            module: ModuleId::Unipool,
            method: SET_PARAMS.to_string(),
        });
    }
    let token = aux
        .address(ModuleId::BlpyToken)
        .ok_or(DeployError::MissingDependency {
            module: ModuleId::Unipool,
            method: SET_PARAMS.to_string(),
            dependency: ModuleId::BlpyToken,
        })?;

    let args = [
        CallArg::Address(token),
        CallArg::Address(pair),
        CallArg::Uint(duration),
    ];
    backend
        .invoke(unipool.address(), SET_PARAMS, &args)
        .map_err(|source| DeployError::InvocationFailed {
            module: ModuleId::Unipool,
            method: SET_PARAMS.to_string(),
            source,
        })?;
    unipool.configured = true;
    info!(pool = %unipool.address(), pair = %pair, duration, "liquidity mining configured");
    Ok(())
}
