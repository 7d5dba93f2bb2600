//! # Proxy Wrapping
//!
//! Optional layer that routes user operations through per-user `DSProxy`
//! instances and script modules. Each wrapped entry of a module set is
//! replaced by a [`ProxyRouter`] that still holds the module's own handle, so
//! reads keep going straight to the module.
//!
//! User proxies are built once per distinct user and shared by every router.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::deployment::construct_module;
use crate::errors::DeployError;
use crate::interfaces::{Call, CallArg, LedgerBackend};
use crate::module_set::{ModuleHandle, ModuleSet};
use crate::types::{Address, ModuleId, TableKind};

/// Script deployed in front of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpec {
    pub artifact: &'static str,
    /// Modules the script is constructed with
    pub args: Vec<ModuleId>,
}

/// How one module set entry gets wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub module: ModuleId,
    pub table: TableKind,
    /// `None` for read-only routers
    pub script: Option<ScriptSpec>,
    /// Whether the entry wraps an existing module
    pub keeps_delegatee: bool,
}

impl ProxySpec {
    fn wrapping(module: ModuleId, table: TableKind, script: &'static str) -> Self {
        Self {
            module,
            table,
            script: Some(ScriptSpec {
                artifact: script,
                args: vec![module],
            }),
            keeps_delegatee: true,
        }
    }
}

/// Entries wrapped by [`wrap_with_proxies`], in wrapping order.
pub fn proxy_specs() -> Vec<ProxySpec> {
    use ModuleId::*;
    vec![
        ProxySpec {
            module: BorrowerWrappers,
            table: TableKind::Core,
            script: Some(ScriptSpec {
                artifact: "BorrowerWrappersScript",
                args: vec![BorrowerOperations, TroveManager, BlpyStaking],
            }),
            keeps_delegatee: false,
        },
        ProxySpec::wrapping(BorrowerOperations, TableKind::Core, "BorrowerOperationsScript"),
        ProxySpec::wrapping(TroveManager, TableKind::Core, "TroveManagerScript"),
        ProxySpec::wrapping(StabilityPool, TableKind::Core, "StabilityPoolScript"),
        ProxySpec {
            module: SortedTroves,
            table: TableKind::Core,
            script: None,
            keeps_delegatee: true,
        },
        ProxySpec::wrapping(UsbToken, TableKind::Core, "TokenScript"),
        ProxySpec::wrapping(BlpyToken, TableKind::Auxiliary, "TokenScript"),
        ProxySpec::wrapping(BlpyStaking, TableKind::Auxiliary, "BLPYStakingScript"),
    ]
}

/// One `DSProxy` per distinct user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProxies {
    proxies: BTreeMap<Address, Address>,
}

impl UserProxies {
    /// Construct a proxy for every distinct user. Repeated users share one.
    pub(crate) fn build(
        backend: &mut dyn LedgerBackend,
        users: &[Address],
    ) -> Result<Self, DeployError> {
        let mut proxies = BTreeMap::new();
        for &user in users {
            if proxies.contains_key(&user) {
                continue;
            }
            let handle = construct_module(
                backend,
                ModuleId::UserProxy,
                ModuleId::UserProxy.name(),
                &[CallArg::Address(user)],
            )?;
            proxies.insert(user, handle.address());
        }
        Ok(Self { proxies })
    }

    pub fn get(&self, user: Address) -> Option<Address> {
        self.proxies.get(&user).copied()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.proxies.iter().map(|(user, proxy)| (*user, *proxy))
    }
}

/// Association of a user with their proxy for one wrapped module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyBinding {
    pub owner: Address,
    pub user: Address,
    pub proxy: Address,
    pub script: Option<Address>,
    /// Underlying module, absent for script-only entries
    pub target: Option<Address>,
}

/// Replacement entry for a wrapped module.
#[derive(Debug)]
pub struct ProxyRouter {
    module: ModuleId,
    owner: Address,
    script: Option<ModuleHandle>,
    delegatee: Option<ModuleHandle>,
    bindings: BTreeMap<Address, ProxyBinding>,
}

impl ProxyRouter {
    pub(crate) fn new(
        module: ModuleId,
        owner: Address,
        script: Option<ModuleHandle>,
        delegatee: Option<ModuleHandle>,
        proxies: &UserProxies,
    ) -> Self {
        let script_address = script.as_ref().map(ModuleHandle::address);
        let target = delegatee.as_ref().map(ModuleHandle::address);
        let bindings = proxies
            .iter()
            .map(|(user, proxy)| {
                (
                    user,
                    ProxyBinding {
                        owner,
                        user,
                        proxy,
                        script: script_address,
                        target,
                    },
                )
            })
            .collect();
        Self {
            module,
            owner,
            script,
            delegatee,
            bindings,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn script(&self) -> Option<&ModuleHandle> {
        self.script.as_ref()
    }

    /// The module handle held before wrapping.
    pub fn delegatee(&self) -> Option<&ModuleHandle> {
        self.delegatee.as_ref()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &ProxyBinding> {
        self.bindings.values()
    }

    pub fn binding_for(&self, user: Address) -> Result<&ProxyBinding, DeployError> {
        self.bindings
            .get(&user)
            .ok_or_else(|| DeployError::ProxyNotFound {
                module: self.module,
                user: user.to_string(),
            })
    }

    pub fn users(&self) -> impl Iterator<Item = Address> + '_ {
        self.bindings.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The call `user` has to send to run `method` through their proxy.
    pub fn route(
        &self,
        user: Address,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<RoutedCall, DeployError> {
        let binding = self.binding_for(user)?;
        let script = binding.script.ok_or(DeployError::ReadOnlyProxy(self.module))?;
        Ok(RoutedCall {
            module: self.module,
            sender: user,
            proxy: binding.proxy,
            script,
            call: Call::new(method, args),
        })
    }
}

/// User operation addressed to a user proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedCall {
    pub module: ModuleId,
    pub sender: Address,
    pub proxy: Address,
    pub script: Address,
    pub call: Call,
}

impl RoutedCall {
    /// `execute(script, call)` on the proxy, sent by the user.
    pub fn args(&self) -> Vec<CallArg> {
        vec![
            CallArg::Address(self.script),
            CallArg::Call(Box::new(self.call.clone())),
        ]
    }

    pub fn submit(&self, backend: &mut dyn LedgerBackend) -> Result<(), DeployError> {
        backend
            .invoke_as(self.sender, self.proxy, "execute", &self.args())
            .map_err(|source| DeployError::InvocationFailed {
                module: self.module,
                method: self.call.method.clone(),
                source,
            })
    }
}

impl ModuleSet {
    /// Route `method` for `user` through the router of `id`.
    pub fn route(
        &self,
        id: ModuleId,
        user: Address,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<RoutedCall, DeployError> {
        if !self.contains(id) {
            return Err(DeployError::NotFound(id));
        }
        self.router(id)
            .ok_or(DeployError::NotProxied(id))?
            .route(user, method, args)
    }
}

fn resolve_address(core: &ModuleSet, aux: &ModuleSet, id: ModuleId) -> Option<Address> {
    core.handle(id)
        .or_else(|| aux.handle(id))
        .map(ModuleHandle::address)
}

/// Wrap the proxied entries of both sets.
///
/// Everything the wrap needs is checked before the first construction, so a
/// rejected wrap leaves both sets and the backend untouched.
pub(crate) fn wrap_with_proxies(
    backend: &mut dyn LedgerBackend,
    core: &mut ModuleSet,
    aux: &mut ModuleSet,
    owner: Address,
    users: &[Address],
) -> Result<UserProxies, DeployError> {
    core.expect_kind(TableKind::Core)?;
    aux.expect_kind(TableKind::Auxiliary)?;

    let specs = proxy_specs();
    for spec in &specs {
        let set: &ModuleSet = match spec.table {
            TableKind::Core => &*core,
            TableKind::Auxiliary => &*aux,
        };
        if set.is_proxied(spec.module) {
            return Err(DeployError::AlreadyProxied(spec.module));
        }
        if spec.keeps_delegatee && set.handle(spec.module).is_none() {
            return Err(DeployError::NotFound(spec.module));
        }
        if let Some(script) = &spec.script {
            for &dependency in &script.args {
                if resolve_address(&*core, &*aux, dependency).is_none() {
                    return Err(DeployError::MissingDependency {
                        module: spec.module,
                        method: script.artifact.to_string(),
                        dependency,
                    });
                }
            }
        }
    }

    info!(owner = %owner, users = users.len(), routers = specs.len(), "wrapping modules in user proxies");
    let proxies = UserProxies::build(backend, users)?;

    for spec in &specs {
        let script = match &spec.script {
            Some(script) => {
                let args = script
                    .args
                    .iter()
                    .map(|&dependency| {
                        resolve_address(&*core, &*aux, dependency)
                            .map(CallArg::Address)
                            .ok_or(DeployError::NotFound(dependency))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(construct_module(backend, spec.module, script.artifact, &args)?)
            }
            None => None,
        };

        let set = match spec.table {
            TableKind::Core => &mut *core,
            TableKind::Auxiliary => &mut *aux,
        };
        set.wrap_entry(spec.module, |delegatee| {
            ProxyRouter::new(spec.module, owner, script, delegatee, &proxies)
        })?;
        debug!(module = %spec.module, bindings = proxies.len(), "module wrapped");
    }

    Ok(proxies)
}
