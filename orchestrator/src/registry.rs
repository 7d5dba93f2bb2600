//! Module descriptor registry.
//!
//! Two fixed tables describe the protocol: the core table (debt ledger,
//! pools, oracle, debt token and helpers) and the auxiliary table (the BLPY
//! governance token modules). Each descriptor names the artifact to deploy,
//! the constructor arguments, and the wiring calls issued after every module
//! exists. Adding a module means adding a descriptor here.

use std::collections::BTreeSet;

use crate::errors::DeployError;
use crate::types::{ExternalParam, ModuleId, TableKind, Variant, WiringStage};

/// Constructor argument shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorArg {
    /// Address of another module in the same table
    Module(ModuleId),
    /// Operator-supplied address
    External(ExternalParam),
}

/// Wiring call argument shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiringArg {
    /// Address of another module, in either table
    Module(ModuleId),
    /// All-ones word (unbounded list size)
    MaxWord,
}

/// Post-construction configuration call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringCall {
    pub stage: WiringStage,
    pub method: &'static str,
    pub args: Vec<WiringArg>,
}

impl WiringCall {
    pub fn dependencies(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            WiringArg::Module(id) => Some(*id),
            WiringArg::MaxWord => None,
        })
    }
}

/// Static description of one deployable module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    /// Artifact deployed for the active variant
    pub artifact: &'static str,
    pub variant: Variant,
    pub constructor: Vec<ConstructorArg>,
    pub wiring: Vec<WiringCall>,
    production_artifact: &'static str,
    tester_artifact: Option<&'static str>,
}

impl ModuleDescriptor {
    pub fn new(id: ModuleId, artifact: &'static str) -> Self {
        Self {
            id,
            artifact,
            variant: Variant::Production,
            constructor: Vec::new(),
            wiring: Vec::new(),
            production_artifact: artifact,
            tester_artifact: None,
        }
    }

    /// Test double deployed instead when the tester variant is selected.
    pub fn with_tester(mut self, artifact: &'static str) -> Self {
        self.tester_artifact = Some(artifact);
        self
    }

    pub fn constructed_with(mut self, args: impl IntoIterator<Item = ConstructorArg>) -> Self {
        self.constructor.extend(args);
        self
    }

    pub fn wired(
        mut self,
        stage: WiringStage,
        method: &'static str,
        args: impl IntoIterator<Item = WiringArg>,
    ) -> Self {
        self.wiring.push(WiringCall {
            stage,
            method,
            args: args.into_iter().collect(),
        });
        self
    }

    pub fn production_artifact(&self) -> &'static str {
        self.production_artifact
    }

    pub fn tester_artifact(&self) -> Option<&'static str> {
        self.tester_artifact
    }

    /// Modules whose addresses the constructor needs.
    pub fn constructor_dependencies(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.constructor.iter().filter_map(|arg| match arg {
            ConstructorArg::Module(id) => Some(*id),
            ConstructorArg::External(_) => None,
        })
    }

    /// Modules referenced by any wiring call, across all stages.
    pub fn wiring_dependencies(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.wiring.iter().flat_map(WiringCall::dependencies)
    }

    pub(crate) fn select(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self.artifact = match variant {
            Variant::Production => self.production_artifact,
            Variant::Tester => self.tester_artifact.unwrap_or(self.production_artifact),
        };
        self
    }
}

/// Ordered set of descriptors. Order is the wiring order and the
/// tie-break for construction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTable {
    kind: TableKind,
    variant: Variant,
    descriptors: Vec<ModuleDescriptor>,
}

impl DescriptorTable {
    /// Build a table from custom descriptors, rejecting duplicate identities.
    pub fn new(kind: TableKind, descriptors: Vec<ModuleDescriptor>) -> Result<Self, DeployError> {
        let mut seen = BTreeSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.id) {
                return Err(DeployError::DuplicateDescriptor(descriptor.id));
            }
        }
        Ok(Self {
            kind,
            variant: Variant::Production,
            descriptors,
        })
    }

    /// The core protocol table.
    pub fn core() -> Self {
        use ModuleId::*;
        use WiringArg::{MaxWord, Module as M};
        let stage = WiringStage::Core;

        Self {
            kind: TableKind::Core,
            variant: Variant::Production,
            descriptors: vec![
                ModuleDescriptor::new(PriceFeedTestnet, "PriceFeedTestnet"),
                ModuleDescriptor::new(SortedTroves, "SortedTroves").wired(
                    stage,
                    "setParams",
                    [MaxWord, M(TroveManager), M(BorrowerOperations)],
                ),
                ModuleDescriptor::new(TroveManager, "TroveManager")
                    .with_tester("TroveManagerTester")
                    .wired(
                        stage,
                        "setAddresses",
                        [
                            M(BorrowerOperations),
                            M(ActivePool),
                            M(DefaultPool),
                            M(StabilityPool),
                            M(GasPool),
                            M(CollSurplusPool),
                            M(PriceFeedTestnet),
                            M(UsbToken),
                            M(SortedTroves),
                            M(BlpyToken),
                            M(BlpyStaking),
                        ],
                    ),
                ModuleDescriptor::new(ActivePool, "ActivePool")
                    .with_tester("ActivePoolTester")
                    .wired(
                        stage,
                        "setAddresses",
                        [
                            M(BorrowerOperations),
                            M(TroveManager),
                            M(StabilityPool),
                            M(DefaultPool),
                        ],
                    ),
                ModuleDescriptor::new(StabilityPool, "StabilityPool")
                    .with_tester("StabilityPoolTester")
                    .wired(
                        stage,
                        "setAddresses",
                        [
                            M(BorrowerOperations),
                            M(TroveManager),
                            M(ActivePool),
                            M(UsbToken),
                            M(SortedTroves),
                            M(PriceFeedTestnet),
                            M(CommunityIssuance),
                        ],
                    ),
                ModuleDescriptor::new(GasPool, "GasPool"),
                ModuleDescriptor::new(DefaultPool, "DefaultPool")
                    .with_tester("DefaultPoolTester")
                    .wired(stage, "setAddresses", [M(TroveManager), M(ActivePool)]),
                ModuleDescriptor::new(CollSurplusPool, "CollSurplusPool").wired(
                    stage,
                    "setAddresses",
                    [M(BorrowerOperations), M(TroveManager), M(ActivePool)],
                ),
                ModuleDescriptor::new(FunctionCaller, "FunctionCaller")
                    .wired(stage, "setTroveManagerAddress", [M(TroveManager)])
                    .wired(stage, "setSortedTrovesAddress", [M(SortedTroves)]),
                ModuleDescriptor::new(BorrowerOperations, "BorrowerOperations")
                    .with_tester("BorrowerOperationsTester")
                    .wired(
                        stage,
                        "setAddresses",
                        [
                            M(TroveManager),
                            M(ActivePool),
                            M(DefaultPool),
                            M(StabilityPool),
                            M(GasPool),
                            M(CollSurplusPool),
                            M(PriceFeedTestnet),
                            M(SortedTroves),
                            M(UsbToken),
                            M(BlpyStaking),
                        ],
                    ),
                ModuleDescriptor::new(HintHelpers, "HintHelpers").wired(
                    stage,
                    "setAddresses",
                    [M(SortedTroves), M(TroveManager)],
                ),
                ModuleDescriptor::new(UsbToken, "USBToken")
                    .with_tester("USBTokenTester")
                    .constructed_with([
                        ConstructorArg::Module(TroveManager),
                        ConstructorArg::Module(StabilityPool),
                        ConstructorArg::Module(BorrowerOperations),
                    ]),
            ],
        }
    }

    /// The BLPY governance token table.
    pub fn auxiliary() -> Self {
        use ModuleId::*;
        use WiringArg::Module as M;

        Self {
            kind: TableKind::Auxiliary,
            variant: Variant::Production,
            descriptors: vec![
                ModuleDescriptor::new(BlpyStaking, "BLPYStaking").wired(
                    WiringStage::Bridge,
                    "setAddresses",
                    [
                        M(BlpyToken),
                        M(UsbToken),
                        M(TroveManager),
                        M(BorrowerOperations),
                        M(ActivePool),
                    ],
                ),
                ModuleDescriptor::new(LockupContractFactory, "LockupContractFactory").wired(
                    WiringStage::Auxiliary,
                    "setBLPYTokenAddress",
                    [M(BlpyToken)],
                ),
                ModuleDescriptor::new(CommunityIssuance, "CommunityIssuance")
                    .with_tester("CommunityIssuanceTester")
                    .wired(
                        WiringStage::Bridge,
                        "setAddresses",
                        [M(BlpyToken), M(StabilityPool)],
                    ),
                ModuleDescriptor::new(BlpyToken, "BLPYToken")
                    .with_tester("BLPYTokenTester")
                    .constructed_with([
                        ConstructorArg::Module(CommunityIssuance),
                        ConstructorArg::Module(BlpyStaking),
                        ConstructorArg::Module(LockupContractFactory),
                        ConstructorArg::External(ExternalParam::Bounty),
                        ConstructorArg::External(ExternalParam::LpRewards),
                        ConstructorArg::External(ExternalParam::Multisig),
                    ]),
            ],
        }
    }

    /// Fixed table for `kind`.
    pub fn fixed(kind: TableKind) -> Self {
        match kind {
            TableKind::Core => Self::core(),
            TableKind::Auxiliary => Self::auxiliary(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.descriptors.iter().any(|d| d.id == id)
    }

    pub fn describe(&self, id: ModuleId) -> Result<&ModuleDescriptor, DeployError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or(DeployError::NotFound(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.descriptors.iter().map(|d| d.id)
    }

    pub(crate) fn set_variant(&mut self, variant: Variant) {
        self.variant = variant;
        self.descriptors = core::mem::take(&mut self.descriptors)
            .into_iter()
            .map(|d| d.select(variant))
            .collect();
    }
}

/// Look up a module in the fixed core and auxiliary tables.
pub fn describe(id: ModuleId) -> Result<ModuleDescriptor, DeployError> {
    [DescriptorTable::core(), DescriptorTable::auxiliary()]
        .into_iter()
        .find_map(|table| table.describe(id).ok().cloned())
        .ok_or(DeployError::NotFound(id))
}

/// Descriptor for the liquidity mining pool, deployed outside both tables.
pub fn unipool_descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ModuleId::Unipool, "Unipool")
}
