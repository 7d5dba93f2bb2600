//! Deployment configuration.
//!
//! Raw values come from command-line flags or `BLOCPAY_*` environment
//! variables; [`DeployConfig::from_raw`] turns them into typed settings once,
//! before any run exists.

use crate::backends::BackendKind;
use crate::errors::DeployError;
use crate::run::{PipelineOptions, ProxyOptions, UnipoolOptions};
use crate::types::{Address, ExternalAddresses, Variant};

/// Unparsed settings, as supplied by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    pub backend: Option<String>,
    pub testers: bool,
    pub bounty: Option<String>,
    pub lp_rewards: Option<String>,
    pub multisig: Option<String>,
    pub owner: Option<String>,
    pub users: Vec<String>,
    pub unipool_pair: Option<String>,
    pub unipool_duration: Option<u64>,
}

/// Validated deployment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub backend: BackendKind,
    pub variant: Variant,
    pub externals: ExternalAddresses,
    pub owner: Option<Address>,
    pub users: Vec<Address>,
    pub unipool: Option<UnipoolOptions>,
}

/// Parse one `0x`-prefixed hex address, naming the field on failure.
pub fn parse_address(field: &str, value: &str) -> Result<Address, DeployError> {
    value
        .trim()
        .parse()
        .map_err(|err| DeployError::Config(format!("{field}: {err}")))
}

/// Parse a comma-separated address list. Empty items are skipped.
pub fn parse_address_list(field: &str, value: &str) -> Result<Vec<Address>, DeployError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_address(field, item))
        .collect()
}

fn required(field: &str, value: Option<&str>) -> Result<Address, DeployError> {
    match value {
        Some(value) => parse_address(field, value),
        None => Err(DeployError::Config(format!("{field} address is required"))),
    }
}

impl DeployConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, DeployError> {
        let backend = BackendKind::resolve(raw.backend.as_deref())?;
        let externals = ExternalAddresses {
            bounty: required("bounty", raw.bounty.as_deref())?,
            lp_rewards: required("lp_rewards", raw.lp_rewards.as_deref())?,
            multisig: required("multisig", raw.multisig.as_deref())?,
        };
        let owner = raw
            .owner
            .as_deref()
            .map(|value| parse_address("owner", value))
            .transpose()?;

        let mut users = Vec::new();
        for value in &raw.users {
            users.extend(parse_address_list("user", value)?);
        }

        let unipool = match (&raw.unipool_pair, raw.unipool_duration) {
            (Some(pair), Some(duration)) => Some(UnipoolOptions {
                pair: parse_address("unipool_pair", pair)?,
                duration,
            }),
            (None, None) => None,
            _ => {
                return Err(DeployError::Config(
                    "unipool pair and duration must be set together".into(),
                ))
            }
        };

        let config = Self {
            backend,
            variant: Variant::from_flag(raw.testers),
            externals,
            owner,
            users,
            unipool,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.externals.multisig == Address::ZERO {
            return Err(DeployError::Config("multisig cannot be the zero address".into()));
        }
        if !self.users.is_empty() && self.owner.is_none() {
            return Err(DeployError::Config("user proxies need an owner".into()));
        }
        if matches!(self.unipool, Some(UnipoolOptions { duration: 0, .. })) {
            return Err(DeployError::Config("unipool duration must be positive".into()));
        }
        Ok(())
    }

    /// Proxies are wrapped whenever an owner is configured.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            variant: self.variant,
            externals: self.externals,
            proxies: self.owner.map(|owner| ProxyOptions {
                owner,
                users: self.users.clone(),
            }),
            unipool: self.unipool,
        }
    }
}
