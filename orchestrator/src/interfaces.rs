//! Ledger backend interface.
//!
//! The orchestrator never talks to a chain directly. Every construction and
//! configuration call goes through a [`LedgerBackend`], which is injected into
//! the run and fixed for its whole lifetime.

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::types::Address;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Argument passed to a module constructor or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    /// Address of a module or account
    Address(Address),
    /// Unsigned integer parameter
    Uint(u64),
    /// Raw 32-byte word
    Word([u8; 32]),
    /// Encoded call forwarded by a proxy
    Call(Box<Call>),
}

impl CallArg {
    /// All-ones word, used as an unbounded size parameter.
    pub const MAX_WORD: CallArg = CallArg::Word([0xff; 32]);

    /// Addresses referenced by this argument, including nested calls.
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            CallArg::Address(address) => vec![*address],
            CallArg::Call(call) => call.args.iter().flat_map(CallArg::addresses).collect(),
            CallArg::Uint(_) | CallArg::Word(_) => Vec::new(),
        }
    }
}

/// Method name plus arguments, as forwarded through a user proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub method: String,
    pub args: Vec<CallArg>,
}

impl Call {
    pub fn new(method: impl Into<String>, args: Vec<CallArg>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

/// Optional behaviour a backend supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    /// Constructed modules must be registered as the deployed instance of
    /// their artifact before anything else uses them.
    pub registers_deployments: bool,
}

/// One recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    Construct {
        seq: u64,
        artifact: String,
        address: Address,
        args: Vec<CallArg>,
    },
    Invoke {
        seq: u64,
        sender: Option<Address>,
        target: Address,
        method: String,
        args: Vec<CallArg>,
    },
    Register {
        seq: u64,
        artifact: String,
        address: Address,
    },
}

impl LedgerEvent {
    pub fn seq(&self) -> u64 {
        match self {
            LedgerEvent::Construct { seq, .. }
            | LedgerEvent::Invoke { seq, .. }
            | LedgerEvent::Register { seq, .. } => *seq,
        }
    }
}

/// Capability interface every deployment backend implements.
///
/// All calls are blocking round-trips: they return once the backend has
/// confirmed success or failure.
pub trait LedgerBackend {
    /// Short backend name for logs and manifests.
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Instantiate `artifact` with constructor arguments, returning its address.
    fn construct(&mut self, artifact: &str, args: &[CallArg]) -> BackendResult<Address>;

    /// Call a configuration method on a live module as the deployer.
    fn invoke(&mut self, target: Address, method: &str, args: &[CallArg]) -> BackendResult<()>;

    /// Call a method on a live module on behalf of `sender`.
    fn invoke_as(
        &mut self,
        sender: Address,
        target: Address,
        method: &str,
        args: &[CallArg],
    ) -> BackendResult<()>;

    /// Read-only inspection of the configuration a module recorded under `key`.
    fn query(&self, target: Address, key: &str) -> BackendResult<Option<Vec<CallArg>>>;

    /// Record `address` as the deployed instance of `artifact`.
    ///
    /// Only called when [`BackendCapabilities::registers_deployments`] is set.
    fn register_deployed(&mut self, artifact: &str, address: Address) -> BackendResult<()> {
        let _ = (artifact, address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_call_addresses() {
        let a = Address::new([1; 20]);
        let b = Address::new([2; 20]);
        let arg = CallArg::Call(Box::new(Call::new(
            "openTrove",
            vec![CallArg::Address(a), CallArg::Uint(5), CallArg::Address(b)],
        )));
        assert_eq!(arg.addresses(), vec![a, b]);
        assert!(CallArg::MAX_WORD.addresses().is_empty());
    }

    #[test]
    fn test_call_arg_json_shape() {
        let json = serde_json::to_value(CallArg::Uint(7)).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "uint", "value": 7 }));
    }
}
