//! # Memory Ledger
//!
//! In-process simulated chain.
//! Deterministic, but volatile (state lost when dropped).
//!
//! Good for:
//! - Testing orchestration against recorded call logs
//! - Local dry runs that still enforce setter rules
//! - Fault injection

use std::collections::{BTreeMap, BTreeSet};

use super::journal::Journal;
use crate::errors::BackendError;
use crate::interfaces::{BackendCapabilities, BackendResult, CallArg, LedgerBackend, LedgerEvent};
use crate::types::Address;

const ADDRESS_PREFIX: u8 = 0x4d;

/// Injected backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail the n-th invoke attempt (1-based)
    Invoke { nth: usize },
    /// Fail every construction of this artifact
    Construct { artifact: String },
}

/// In-memory ledger backend
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    journal: Journal,
    /// Artifact by module address
    modules: BTreeMap<Address, String>,
    /// Setters that already ran, per module
    configured: BTreeSet<(Address, String)>,
    /// Deployed instance registered per artifact
    deployed: BTreeMap<String, Address>,
    faults: Vec<Fault>,
    invoke_attempts: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            journal: Journal::new(ADDRESS_PREFIX),
            modules: BTreeMap::new(),
            configured: BTreeSet::new(),
            deployed: BTreeMap::new(),
            faults: Vec::new(),
            invoke_attempts: 0,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Every successful operation, in order.
    pub fn events(&self) -> &[LedgerEvent] {
        self.journal.events()
    }

    pub fn invocations(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Invoke { .. }))
    }

    /// Invoke calls attempted, failed ones included.
    pub fn invoke_attempts(&self) -> usize {
        self.invoke_attempts
    }

    /// Instance registered as the deployed `artifact`.
    pub fn deployed(&self, artifact: &str) -> Option<Address> {
        self.deployed.get(artifact).copied()
    }

    pub fn artifact_at(&self, address: Address) -> Option<&str> {
        self.modules.get(&address).map(String::as_str)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    fn call(
        &mut self,
        sender: Option<Address>,
        target: Address,
        method: &str,
        args: &[CallArg],
    ) -> BackendResult<()> {
        self.invoke_attempts += 1;
        let attempt = self.invoke_attempts;
        if self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::Invoke { nth } if *nth == attempt))
        {
            return Err(BackendError::new(format!(
                "injected fault on invoke #{attempt} ({method})"
            )));
        }

        if !self.modules.contains_key(&target) {
            return Err(BackendError::new(format!("no module deployed at {target}")));
        }

        // owner-only setters renounce ownership once they succeed
        if sender.is_none() && method.starts_with("set") {
            let key = (target, method.to_string());
            if self.configured.contains(&key) {
                return Err(BackendError::new("Ownable: caller is not the owner"));
            }
            self.configured.insert(key);
        }

        self.journal.invoke(sender, target, method, args);
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerBackend for MemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            registers_deployments: true,
        }
    }

    fn construct(&mut self, artifact: &str, args: &[CallArg]) -> BackendResult<Address> {
        if self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::Construct { artifact: a } if a == artifact))
        {
            return Err(BackendError::new(format!(
                "injected fault constructing {artifact}"
            )));
        }

        // addresses in this ledger's range must belong to a constructed module
        for referenced in args.iter().flat_map(CallArg::addresses) {
            if referenced.as_bytes()[0] == ADDRESS_PREFIX && !self.modules.contains_key(&referenced) {
                return Err(BackendError::new(format!(
                    "{artifact} constructed with unknown module {referenced}"
                )));
            }
        }

        let address = self.journal.allocate();
        self.modules.insert(address, artifact.to_string());
        self.journal.construct(artifact, address, args);
        Ok(address)
    }

    fn invoke(&mut self, target: Address, method: &str, args: &[CallArg]) -> BackendResult<()> {
        self.call(None, target, method, args)
    }

    fn invoke_as(
        &mut self,
        sender: Address,
        target: Address,
        method: &str,
        args: &[CallArg],
    ) -> BackendResult<()> {
        self.call(Some(sender), target, method, args)
    }

    fn query(&self, target: Address, key: &str) -> BackendResult<Option<Vec<CallArg>>> {
        if !self.modules.contains_key(&target) {
            return Err(BackendError::new(format!("no module deployed at {target}")));
        }
        Ok(self.journal.last_call(target, key))
    }

    fn register_deployed(&mut self, artifact: &str, address: Address) -> BackendResult<()> {
        if self.modules.get(&address).map(String::as_str) != Some(artifact) {
            return Err(BackendError::new(format!(
                "{address} is not an instance of {artifact}"
            )));
        }
        self.deployed.insert(artifact.to_string(), address);
        self.journal.register(artifact, address);
        Ok(())
    }
}
