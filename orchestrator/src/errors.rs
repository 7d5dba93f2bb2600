//! Deployment error definitions.

use thiserror::Error;

use crate::run::RunState;
use crate::types::{ExternalParam, ModuleId, TableKind};

/// Error reported by a ledger backend, propagated verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Deployment orchestration errors
#[derive(Debug, Error)]
pub enum DeployError {
    // Registry errors (1xx)
    #[error("module {0} is not described by any descriptor table")]
    NotFound(ModuleId),
    #[error("module {0} is described twice")]
    DuplicateDescriptor(ModuleId),
    #[error("{module} is constructed with {dependency}, which is not in the {table} table")]
    UnknownConstructorDependency {
        module: ModuleId,
        dependency: ModuleId,
        table: TableKind,
    },

    // Ordering errors (2xx)
    #[error("constructor dependency cycle between {}", format_modules(.involved))]
    CyclicConstructorDependency { involved: Vec<ModuleId> },

    // Backend errors (3xx)
    #[error("no ledger backend available: {0}")]
    BackendUnavailable(String),
    #[error("construction of {module} ({artifact}) failed: {source}")]
    ConstructionFailed {
        module: ModuleId,
        artifact: String,
        #[source]
        source: BackendError,
    },
    #[error("{module}.{method} failed: {source}")]
    InvocationFailed {
        module: ModuleId,
        method: String,
        #[source]
        source: BackendError,
    },

    // Wiring errors (4xx)
    #[error("{module}.{method} needs {dependency}, which has not been constructed")]
    MissingDependency {
        module: ModuleId,
        method: String,
        dependency: ModuleId,
    },
    #[error("{module}.{method} has already been issued")]
    AlreadyWired { module: ModuleId, method: String },
    #[error("expected a {expected} module set, got {got}")]
    TableMismatch { expected: TableKind, got: TableKind },

    // Proxy errors (5xx)
    #[error("{0} is already wrapped in user proxies")]
    AlreadyProxied(ModuleId),
    #[error("{module} has no proxy for user {user}")]
    ProxyNotFound { module: ModuleId, user: String },
    #[error("{0} proxies are read-only and cannot route calls")]
    ReadOnlyProxy(ModuleId),
    #[error("{0} is not wrapped in user proxies")]
    NotProxied(ModuleId),

    // Run state errors (6xx)
    #[error("cannot {operation} while the run is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: RunState,
    },
    #[error("run already failed: {0}")]
    RunFailed(String),
    #[error("{0} was built by another deployment run")]
    ForeignModuleSet(String),

    // Configuration errors (9xx)
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{module} needs the {param} address")]
    MissingExternal {
        module: ModuleId,
        param: ExternalParam,
    },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeployError {
    /// Stable numeric code, grouped by category.
    pub const fn code(&self) -> u16 {
        match self {
            DeployError::NotFound(_) => 100,
            DeployError::DuplicateDescriptor(_) => 101,
            DeployError::UnknownConstructorDependency { .. } => 102,

            DeployError::CyclicConstructorDependency { .. } => 200,

            DeployError::BackendUnavailable(_) => 300,
            DeployError::ConstructionFailed { .. } => 301,
            DeployError::InvocationFailed { .. } => 302,

            DeployError::MissingDependency { .. } => 400,
            DeployError::AlreadyWired { .. } => 401,
            DeployError::TableMismatch { .. } => 402,

            DeployError::AlreadyProxied(_) => 500,
            DeployError::ProxyNotFound { .. } => 501,
            DeployError::ReadOnlyProxy(_) => 502,
            DeployError::NotProxied(_) => 503,

            DeployError::InvalidTransition { .. } => 600,
            DeployError::RunFailed(_) => 601,
            DeployError::ForeignModuleSet(_) => 602,

            DeployError::Config(_) => 900,
            DeployError::MissingExternal { .. } => 901,
            DeployError::Serialization(_) => 902,
        }
    }

    /// Whether the error leaves the run unusable.
    ///
    /// Backend failures and constructor cycles end the run. Caller mistakes
    /// are rejected before any backend call and leave the run where it was.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeployError::CyclicConstructorDependency { .. }
                | DeployError::BackendUnavailable(_)
                | DeployError::ConstructionFailed { .. }
                | DeployError::InvocationFailed { .. }
        )
    }
}

fn format_modules(modules: &[ModuleId]) -> String {
    modules
        .iter()
        .map(ModuleId::name)
        .collect::<Vec<_>>()
        .join(", ")
}
