//! blocPay Deployment Orchestrator
//!
//! Two-phase deploy-then-wire orchestration for the blocPay lending protocol.
//!
//! ## Architecture
//!
//! - **Registry**: Descriptor tables for the core protocol and the BLPY token
//! - **Ordering**: Constructor-dependency levels, cycles rejected up front
//! - **Deployment**: Phase 1, every module constructed in dependency order
//! - **Wiring**: Phase 2, setter calls issued at most once per module
//! - **Proxy**: Optional per-user proxy and script routing
//! - **Run**: `Idle -> Constructing -> Wired -> [Proxied] -> Ready` state machine
//! - **Backends**: In-memory ledger and dry-run planner
//!
//! ## Failure Model
//!
//! Backend failures are fatal and end the run. Caller mistakes are rejected
//! before any backend call:
//! - Allowed after a caller error: retry with corrected input
//! - Blocked after a fatal error: every further operation (`RunFailed`)

// Core module declarations
pub mod types;
pub mod errors;
pub mod interfaces;
pub mod config;

// Orchestration modules
pub mod registry;
pub mod variant;
pub mod ordering;
pub mod module_set;
pub mod deployment;
pub mod wiring;
pub mod proxy;
pub mod unipool;
pub mod run;
pub mod manifest;

pub mod backends;

pub use backends::{BackendKind, DeploymentPlan, Fault, MemoryLedger, PlanLedger};
pub use config::{DeployConfig, RawConfig};
pub use errors::{BackendError, DeployError};
pub use interfaces::{BackendCapabilities, Call, CallArg, LedgerBackend, LedgerEvent};
pub use manifest::AddressBook;
pub use module_set::{AuxiliaryModuleSet, CoreModuleSet, ModuleEntry, ModuleHandle, ModuleSet};
pub use proxy::{ProxyBinding, ProxyRouter, RoutedCall, UserProxies};
pub use registry::{describe, DescriptorTable, ModuleDescriptor};
pub use run::{Deployment, DeploymentRun, PipelineOptions, ProxyOptions, RunState, UnipoolOptions};
pub use types::{Address, ExternalAddresses, ModuleId, RunId, TableKind, Variant, WiringStage};
pub use unipool::Unipool;
pub use variant::select_variant;
