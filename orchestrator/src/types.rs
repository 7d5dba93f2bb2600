//! Common types used across the deployment orchestrator.

use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque 20-byte account or module address.
///
/// The orchestrator only moves addresses around; it never inspects or derives
/// anything from their bytes. Parsing exists for the CLI boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;
    pub const ZERO: Address = Address([0; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Error returned when an address string is not `0x` + 40 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
    #[error("address must be {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength {
                expected: Self::LEN,
                got: bytes.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identity of every deployable protocol unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleId {
    // Core
    PriceFeedTestnet,
    SortedTroves,
    TroveManager,
    ActivePool,
    StabilityPool,
    GasPool,
    DefaultPool,
    CollSurplusPool,
    FunctionCaller,
    BorrowerOperations,
    HintHelpers,
    UsbToken,
    // Governance token (BLPY)
    BlpyStaking,
    LockupContractFactory,
    CommunityIssuance,
    BlpyToken,
    // Added by proxy wrapping
    BorrowerWrappers,
    UserProxy,
    // Liquidity mining, deployed on demand
    Unipool,
}

impl ModuleId {
    pub const fn name(&self) -> &'static str {
        match self {
            ModuleId::PriceFeedTestnet => "PriceFeedTestnet",
            ModuleId::SortedTroves => "SortedTroves",
            ModuleId::TroveManager => "TroveManager",
            ModuleId::ActivePool => "ActivePool",
            ModuleId::StabilityPool => "StabilityPool",
            ModuleId::GasPool => "GasPool",
            ModuleId::DefaultPool => "DefaultPool",
            ModuleId::CollSurplusPool => "CollSurplusPool",
            ModuleId::FunctionCaller => "FunctionCaller",
            ModuleId::BorrowerOperations => "BorrowerOperations",
            ModuleId::HintHelpers => "HintHelpers",
            ModuleId::UsbToken => "USBToken",
            ModuleId::BlpyStaking => "BLPYStaking",
            ModuleId::LockupContractFactory => "LockupContractFactory",
            ModuleId::CommunityIssuance => "CommunityIssuance",
            ModuleId::BlpyToken => "BLPYToken",
            ModuleId::BorrowerWrappers => "BorrowerWrappers",
            ModuleId::UserProxy => "DSProxy",
            ModuleId::Unipool => "Unipool",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which descriptor table a module set was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Core,
    Auxiliary,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Core => f.write_str("core"),
            TableKind::Auxiliary => f.write_str("auxiliary"),
        }
    }
}

/// Production module or its test double.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Production,
    Tester,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Production => f.write_str("production"),
            Variant::Tester => f.write_str("tester"),
        }
    }
}

/// Addresses supplied by the operator rather than by another module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalParam {
    Bounty,
    LpRewards,
    Multisig,
}

impl fmt::Display for ExternalParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalParam::Bounty => f.write_str("bounty"),
            ExternalParam::LpRewards => f.write_str("lp_rewards"),
            ExternalParam::Multisig => f.write_str("multisig"),
        }
    }
}

/// Operator addresses consumed by the governance token constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAddresses {
    pub bounty: Address,
    pub lp_rewards: Address,
    pub multisig: Address,
}

impl ExternalAddresses {
    pub fn get(&self, param: ExternalParam) -> Address {
        match param {
            ExternalParam::Bounty => self.bounty,
            ExternalParam::LpRewards => self.lp_rewards,
            ExternalParam::Multisig => self.multisig,
        }
    }
}

/// Phase 2 stage a wiring call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringStage {
    /// Core modules, may reference governance token modules.
    Core,
    /// Governance token modules among themselves.
    Auxiliary,
    /// Governance token modules pointed at core modules.
    Bridge,
}

impl fmt::Display for WiringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiringStage::Core => f.write_str("core"),
            WiringStage::Auxiliary => f.write_str("auxiliary"),
            WiringStage::Bridge => f.write_str("bridge"),
        }
    }
}

/// Identity of one deployment run, stamped on every set it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunId(u64);

impl RunId {
    /// Fresh id, unique within the process.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}
