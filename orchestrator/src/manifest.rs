//! Address book written at the end of a deployment.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::DeployError;
use crate::module_set::{ModuleEntry, ModuleHandle, ModuleSet};
use crate::proxy::{ProxyBinding, UserProxies};
use crate::run::Deployment;
use crate::types::{Address, Variant};

/// One module set entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub artifact: &'static str,
    pub address: Address,
    pub proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<ProxyBinding>,
}

impl ManifestEntry {
    fn from_entry(entry: &ModuleEntry) -> Option<Self> {
        match entry {
            ModuleEntry::Direct(handle) => Some(Self {
                artifact: handle.artifact(),
                address: handle.address(),
                proxied: false,
                script: None,
                bindings: Vec::new(),
            }),
            ModuleEntry::Proxied(router) => {
                let shown = router.delegatee().or(router.script())?;
                Some(Self {
                    artifact: shown.artifact(),
                    address: shown.address(),
                    proxied: true,
                    script: router.script().map(ModuleHandle::address),
                    bindings: router.bindings().copied().collect(),
                })
            }
        }
    }
}

/// Identity name to address, for both module sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBook {
    pub backend: String,
    pub variant: Variant,
    pub core: BTreeMap<String, ManifestEntry>,
    pub auxiliary: BTreeMap<String, ManifestEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unipool: Option<Address>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub user_proxies: BTreeMap<Address, Address>,
}

fn entries(set: &ModuleSet) -> BTreeMap<String, ManifestEntry> {
    set.entries()
        .filter_map(|(id, entry)| Some((id.name().to_string(), ManifestEntry::from_entry(entry)?)))
        .collect()
}

impl AddressBook {
    pub fn from_sets(backend: &str, core: &ModuleSet, auxiliary: &ModuleSet) -> Self {
        Self {
            backend: backend.to_string(),
            variant: core.variant(),
            core: entries(core),
            auxiliary: entries(auxiliary),
            unipool: None,
            user_proxies: BTreeMap::new(),
        }
    }

    pub fn from_deployment(backend: &str, deployment: &Deployment) -> Self {
        let mut book = Self::from_sets(backend, &deployment.core, &deployment.auxiliary);
        book.unipool = deployment.unipool.as_ref().map(|pool| pool.address());
        if let Some(proxies) = &deployment.proxies {
            book.user_proxies = user_proxies(proxies);
        }
        book
    }

    pub fn len(&self) -> usize {
        self.core.len() + self.auxiliary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every module address, core first.
    pub fn addresses(&self) -> impl Iterator<Item = (&str, Address)> {
        self.core
            .iter()
            .chain(self.auxiliary.iter())
            .map(|(name, entry)| (name.as_str(), entry.address))
    }

    pub fn to_json_pretty(&self) -> Result<String, DeployError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn user_proxies(proxies: &UserProxies) -> BTreeMap<Address, Address> {
    proxies.iter().collect()
}
