//! Deploy and wire the blocPay protocol against a ledger backend.
//!
//! Usage:
//!   cargo run --bin deploy -- --backend plan --plan-out plan.json
//!
//! Every flag can come from the environment (or a .env file):
//!   BLOCPAY_BACKEND=memory|plan
//!   BLOCPAY_BOUNTY=0x...
//!   BLOCPAY_LP_REWARDS=0x...
//!   BLOCPAY_MULTISIG=0x...
//!   BLOCPAY_OWNER=0x...            (wraps user proxies when set)
//!   BLOCPAY_USERS=0x...,0x...
//!   BLOCPAY_LOG_FORMAT=json

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blocpay_orchestrator::{
    AddressBook, BackendKind, DeployConfig, DeployError, Deployment, DeploymentRun,
    LedgerBackend, MemoryLedger, PlanLedger, RawConfig,
};

#[derive(Parser, Debug)]
#[command(name = "deploy")]
#[command(version, about = "Deploy and wire the blocPay protocol", long_about = None)]
struct Cli {
    /// Ledger backend (memory or plan)
    #[arg(long, env = "BLOCPAY_BACKEND")]
    backend: Option<String>,

    /// Deploy tester artifacts instead of production ones
    #[arg(long, env = "BLOCPAY_TESTERS")]
    testers: bool,

    /// Bounty address for the BLPY token
    #[arg(long, env = "BLOCPAY_BOUNTY")]
    bounty: Option<String>,

    /// LP rewards address for the BLPY token
    #[arg(long, env = "BLOCPAY_LP_REWARDS")]
    lp_rewards: Option<String>,

    /// Multisig address for the BLPY token
    #[arg(long, env = "BLOCPAY_MULTISIG")]
    multisig: Option<String>,

    /// Proxy owner; enables user proxy wrapping
    #[arg(long, env = "BLOCPAY_OWNER")]
    owner: Option<String>,

    /// User that gets a proxy (repeatable, or comma-separated)
    #[arg(long = "user", env = "BLOCPAY_USERS")]
    users: Vec<String>,

    /// Uniswap pair rewarded by the liquidity mining pool
    #[arg(long, env = "BLOCPAY_UNIPOOL_PAIR")]
    unipool_pair: Option<String>,

    /// Liquidity mining duration in seconds
    #[arg(long, env = "BLOCPAY_UNIPOOL_DURATION")]
    unipool_duration: Option<u64>,

    /// Write the recorded deployment plan here (plan backend)
    #[arg(long, env = "BLOCPAY_PLAN_OUT")]
    plan_out: Option<PathBuf>,

    /// Write the address book here
    #[arg(long, env = "BLOCPAY_MANIFEST_OUT")]
    manifest_out: Option<PathBuf>,

    /// Print the address book as JSON instead of a listing
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            backend: self.backend.clone(),
            testers: self.testers,
            bounty: self.bounty.clone(),
            lp_rewards: self.lp_rewards.clone(),
            multisig: self.multisig.clone(),
            owner: self.owner.clone(),
            users: self.users.clone(),
            unipool_pair: self.unipool_pair.clone(),
            unipool_duration: self.unipool_duration,
        }
    }
}

fn init_tracing() {
    let log_format = std::env::var("BLOCPAY_LOG_FORMAT").unwrap_or_default();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deploy=info,blocpay_orchestrator=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), DeployError> {
    std::fs::write(path, contents)
        .map_err(|err| DeployError::Config(format!("cannot write {}: {err}", path.display())))?;
    info!(path = %path.display(), "written");
    Ok(())
}

fn run_pipeline<B: LedgerBackend>(
    backend: B,
    config: &DeployConfig,
) -> Result<(Deployment, B), DeployError> {
    let mut run = DeploymentRun::new(backend);
    let deployment = run.deploy_protocol(&config.pipeline_options())?;
    Ok((deployment, run.into_backend()))
}

fn print_addresses(book: &AddressBook) {
    println!();
    println!("=== Deployment Complete ===");
    println!();
    println!("Contract Addresses:");
    for (name, address) in book.addresses() {
        println!("  {name}: {address}");
    }
    if let Some(pool) = book.unipool {
        println!("  Unipool: {pool}");
    }
    for (user, proxy) in &book.user_proxies {
        println!("  DSProxy({user}): {proxy}");
    }
}

fn deploy(cli: &Cli) -> Result<(), DeployError> {
    let config = DeployConfig::from_raw(&cli.raw_config())?;
    info!(backend = %config.backend, variant = %config.variant, "=== blocPay Deployment ===");

    let book = match config.backend {
        BackendKind::Memory => {
            let (deployment, ledger) = run_pipeline(MemoryLedger::new(), &config)?;
            info!(events = ledger.events().len(), "memory ledger settled");
            AddressBook::from_deployment(ledger.name(), &deployment)
        }
        BackendKind::Plan => {
            let (deployment, ledger) = run_pipeline(PlanLedger::new(), &config)?;
            let book = AddressBook::from_deployment(ledger.name(), &deployment);
            let plan = ledger.into_plan();
            info!(
                constructions = plan.constructions(),
                invocations = plan.invocations(),
                "deployment plan recorded"
            );
            if let Some(path) = &cli.plan_out {
                write_file(path, &plan.to_json()?)?;
            }
            book
        }
    };

    if let Some(path) = &cli.manifest_out {
        write_file(path, &book.to_json_pretty()?)?;
    }
    if cli.json {
        println!("{}", book.to_json_pretty()?);
    } else {
        print_addresses(&book);
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load environment from .env file
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match deploy(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = err.code(), "{err}");
            eprintln!("error[{}]: {err}", err.code());
            ExitCode::FAILURE
        }
    }
}
