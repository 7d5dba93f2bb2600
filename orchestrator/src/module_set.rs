//! Module sets produced by a deployment run.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::DeployError;
use crate::proxy::ProxyRouter;
use crate::registry::DescriptorTable;
use crate::types::{Address, ModuleId, RunId, TableKind, Variant};

/// Reference to a constructed module instance.
///
/// Owned by its [`ModuleSet`] (or by a proxy router after wrapping) and only
/// ever borrowed, so there is exactly one handle per constructed instance.
#[derive(Debug, PartialEq, Eq)]
pub struct ModuleHandle {
    module: ModuleId,
    artifact: &'static str,
    address: Address,
}

impl ModuleHandle {
    pub(crate) fn new(module: ModuleId, artifact: &'static str, address: Address) -> Self {
        Self {
            module,
            artifact,
            address,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn artifact(&self) -> &'static str {
        self.artifact
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

/// What a module set holds for one identity.
#[derive(Debug)]
pub enum ModuleEntry {
    Direct(ModuleHandle),
    Proxied(ProxyRouter),
}

/// Modules built from one descriptor table.
///
/// Grows during construction, is read during wiring, and may have entries
/// replaced by proxy routers. Entries are never removed.
#[derive(Debug)]
pub struct ModuleSet {
    table: DescriptorTable,
    entries: BTreeMap<ModuleId, ModuleEntry>,
    construction_order: Vec<ModuleId>,
    wired: BTreeSet<(ModuleId, &'static str)>,
    run: Option<RunId>,
}

/// Module set built from the core table.
pub type CoreModuleSet = ModuleSet;
/// Module set built from the governance token table.
pub type AuxiliaryModuleSet = ModuleSet;

impl ModuleSet {
    pub(crate) fn new(table: DescriptorTable) -> Self {
        Self {
            table,
            entries: BTreeMap::new(),
            construction_order: Vec::new(),
            wired: BTreeSet::new(),
            run: None,
        }
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn kind(&self) -> TableKind {
        self.table.kind()
    }

    pub fn variant(&self) -> Variant {
        self.table.variant()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.entries.keys().copied()
    }

    pub fn entry(&self, id: ModuleId) -> Option<&ModuleEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (ModuleId, &ModuleEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// The module's own handle, still reachable after proxy wrapping.
    pub fn handle(&self, id: ModuleId) -> Option<&ModuleHandle> {
        match self.entries.get(&id)? {
            ModuleEntry::Direct(handle) => Some(handle),
            ModuleEntry::Proxied(router) => router.delegatee(),
        }
    }

    /// Address other modules should be configured with.
    ///
    /// For script-only entries this is the script's address.
    pub fn address(&self, id: ModuleId) -> Option<Address> {
        match self.entries.get(&id)? {
            ModuleEntry::Direct(handle) => Some(handle.address()),
            ModuleEntry::Proxied(router) => router
                .delegatee()
                .or(router.script())
                .map(ModuleHandle::address),
        }
    }

    pub fn router(&self, id: ModuleId) -> Option<&ProxyRouter> {
        match self.entries.get(&id)? {
            ModuleEntry::Proxied(router) => Some(router),
            ModuleEntry::Direct(_) => None,
        }
    }

    pub fn is_proxied(&self, id: ModuleId) -> bool {
        self.router(id).is_some()
    }

    /// Identities in the order they were constructed.
    pub fn construction_order(&self) -> &[ModuleId] {
        &self.construction_order
    }

    /// Run that built this set.
    pub fn run_id(&self) -> Option<RunId> {
        self.run
    }

    pub fn is_wired(&self, id: ModuleId, method: &str) -> bool {
        self.wired.iter().any(|(m, call)| *m == id && *call == method)
    }

    pub fn wired_calls(&self) -> usize {
        self.wired.len()
    }

    pub(crate) fn insert(&mut self, handle: ModuleHandle) -> Result<(), DeployError> {
        let id = handle.module();
        if self.entries.contains_key(&id) {
            return Err(DeployError::DuplicateDescriptor(id));
        }
        self.entries.insert(id, ModuleEntry::Direct(handle));
        self.construction_order.push(id);
        Ok(())
    }

    pub(crate) fn stamp(&mut self, run: RunId) {
        self.run = Some(run);
    }

    /// Reject sets built by any other run.
    pub(crate) fn expect_run(&self, run: RunId) -> Result<(), DeployError> {
        if self.run == Some(run) {
            Ok(())
        } else {
            Err(DeployError::ForeignModuleSet(format!("{} module set", self.kind())))
        }
    }

    pub(crate) fn mark_wired(&mut self, id: ModuleId, method: &'static str) {
        self.wired.insert((id, method));
    }

    /// Replace the entry for `id` with a router built from its current handle.
    pub(crate) fn wrap_entry(
        &mut self,
        id: ModuleId,
        build: impl FnOnce(Option<ModuleHandle>) -> ProxyRouter,
    ) -> Result<(), DeployError> {
        let handle = match self.entries.remove(&id) {
            Some(ModuleEntry::Direct(handle)) => Some(handle),
            Some(ModuleEntry::Proxied(router)) => {
                self.entries.insert(id, ModuleEntry::Proxied(router));
                return Err(DeployError::AlreadyProxied(id));
            }
            None => None,
        };
        self.entries.insert(id, ModuleEntry::Proxied(build(handle)));
        Ok(())
    }

    pub(crate) fn expect_kind(&self, expected: TableKind) -> Result<(), DeployError> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(DeployError::TableMismatch {
                expected,
                got: self.kind(),
            })
        }
    }
}
