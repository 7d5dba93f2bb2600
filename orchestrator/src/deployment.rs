//! Phase 1: construct every module of a descriptor table.

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::interfaces::{CallArg, LedgerBackend};
use crate::module_set::{ModuleHandle, ModuleSet};
use crate::ordering::construction_levels;
use crate::registry::{ConstructorArg, DescriptorTable};
use crate::types::{ExternalAddresses, ModuleId};

/// Construct one artifact and register it when the backend asks for it.
pub(crate) fn construct_module(
    backend: &mut dyn LedgerBackend,
    module: ModuleId,
    artifact: &'static str,
    args: &[CallArg],
) -> Result<ModuleHandle, DeployError> {
    let address = backend
        .construct(artifact, args)
        .map_err(|source| DeployError::ConstructionFailed {
            module,
            artifact: artifact.to_string(),
            source,
        })?;

    if backend.capabilities().registers_deployments {
        backend
            .register_deployed(artifact, address)
            .map_err(|source| DeployError::ConstructionFailed {
                module,
                artifact: artifact.to_string(),
                source,
            })?;
    }

    debug!(module = %module, artifact, address = %address, "module constructed");
    Ok(ModuleHandle::new(module, artifact, address))
}

/// Construct every descriptor of `table` in constructor-dependency order.
///
/// The order is computed up front, so a cycle or an unknown dependency is
/// reported before the backend sees a single call. A failed construction
/// drops everything built so far.
pub(crate) fn deploy_table(
    backend: &mut dyn LedgerBackend,
    table: DescriptorTable,
    externals: Option<&ExternalAddresses>,
) -> Result<ModuleSet, DeployError> {
    let levels = construction_levels(table.kind(), table.descriptors())?;
    info!(
        table = %table.kind(),
        variant = %table.variant(),
        modules = table.len(),
        levels = levels.len(),
        "deploying modules"
    );

    // externals are checked before construction starts
    for descriptor in table.descriptors() {
        for arg in &descriptor.constructor {
            if let ConstructorArg::External(param) = arg {
                if externals.is_none() {
                    return Err(DeployError::MissingExternal {
                        module: descriptor.id,
                        param: *param,
                    });
                }
            }
        }
    }

    let mut set = ModuleSet::new(table.clone());
    for level in &levels {
        for &id in &level.modules {
            let descriptor = table.describe(id)?;
            let mut args = Vec::with_capacity(descriptor.constructor.len());
            for arg in &descriptor.constructor {
                args.push(match arg {
                    ConstructorArg::Module(dependency) => CallArg::Address(
                        set.address(*dependency)
                            .ok_or(DeployError::NotFound(*dependency))?,
                    ),
                    ConstructorArg::External(param) => CallArg::Address(
                        externals
                            .ok_or(DeployError::MissingExternal {
                                module: id,
                                param: *param,
                            })?
                            .get(*param),
                    ),
                });
            }
            let handle = construct_module(backend, id, descriptor.artifact, &args)?;
            set.insert(handle)?;
        }
    }

    info!(table = %set.kind(), modules = set.len(), "modules deployed");
    Ok(set)
}
