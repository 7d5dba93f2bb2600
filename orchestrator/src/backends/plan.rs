//! Dry-run planner backend.
//!
//! Hands out placeholder addresses and records every step so the deployment
//! can be reviewed, or replayed against a real network by other tooling.
//! Nothing is registered: this backend has no notion of a deployed singleton.

use serde::{Deserialize, Serialize};

use super::journal::Journal;
use crate::errors::{BackendError, DeployError};
use crate::interfaces::{BackendCapabilities, BackendResult, CallArg, LedgerBackend, LedgerEvent};
use crate::types::Address;

const ADDRESS_PREFIX: u8 = 0x50;

/// Recorded deployment steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub steps: Vec<LedgerEvent>,
}

impl DeploymentPlan {
    pub fn constructions(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, LedgerEvent::Construct { .. }))
            .count()
    }

    pub fn invocations(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, LedgerEvent::Invoke { .. }))
            .count()
    }

    pub fn to_json(&self) -> Result<String, DeployError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Planner ledger backend
#[derive(Debug, Clone)]
pub struct PlanLedger {
    journal: Journal,
}

impl PlanLedger {
    pub fn new() -> Self {
        Self {
            journal: Journal::new(ADDRESS_PREFIX),
        }
    }

    pub fn steps(&self) -> &[LedgerEvent] {
        self.journal.events()
    }

    pub fn into_plan(self) -> DeploymentPlan {
        DeploymentPlan {
            steps: self.journal.into_events(),
        }
    }
}

impl Default for PlanLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerBackend for PlanLedger {
    fn name(&self) -> &str {
        "plan"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn construct(&mut self, artifact: &str, args: &[CallArg]) -> BackendResult<Address> {
        if artifact.is_empty() {
            return Err(BackendError::new("artifact name is empty"));
        }
        let address = self.journal.allocate();
        self.journal.construct(artifact, address, args);
        Ok(address)
    }

    fn invoke(&mut self, target: Address, method: &str, args: &[CallArg]) -> BackendResult<()> {
        self.journal.invoke(None, target, method, args);
        Ok(())
    }

    fn invoke_as(
        &mut self,
        sender: Address,
        target: Address,
        method: &str,
        args: &[CallArg],
    ) -> BackendResult<()> {
        self.journal.invoke(Some(sender), target, method, args);
        Ok(())
    }

    fn query(&self, target: Address, key: &str) -> BackendResult<Option<Vec<CallArg>>> {
        Ok(self.journal.last_call(target, key))
    }
}
