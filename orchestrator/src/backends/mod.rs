//! # Ledger Backends
//!
//! Implementations of [`LedgerBackend`](crate::interfaces::LedgerBackend).
//!
//! Available backends:
//! - `MemoryLedger` - in-process simulated chain (registers deployments)
//! - `PlanLedger` - dry-run planner producing a JSON deployment plan

mod journal;
mod memory;
mod plan;

use core::fmt;
use core::str::FromStr;

use serde::Serialize;

use crate::errors::DeployError;

pub use memory::{Fault, MemoryLedger};
pub use plan::{DeploymentPlan, PlanLedger};

/// Bundled backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Plan,
}

impl BackendKind {
    /// Resolve the backend once from the execution context.
    ///
    /// A missing or unrecognised value is `BackendUnavailable`; there is no
    /// default and no fallback between backends.
    pub fn resolve(context: Option<&str>) -> Result<Self, DeployError> {
        match context.map(str::trim) {
            None | Some("") => Err(DeployError::BackendUnavailable(
                "set --backend or BLOCPAY_BACKEND".into(),
            )),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for BackendKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "plan" => Ok(BackendKind::Plan),
            other => Err(DeployError::BackendUnavailable(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => f.write_str("memory"),
            BackendKind::Plan => f.write_str("plan"),
        }
    }
}
