//! Formula Deployer - ordered smart-contract deployment and configuration
//!
//! Reads a formula (a numbered list of deploy and call steps), resolves
//! `{{name.address}}` references between steps, and drives each transaction
//! to confirmation on the selected EVM network.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

mod chain;
mod cli;
mod compiler;
mod config;
mod coordination;
mod error;
mod formula;
mod tx;

#[cfg(test)]
mod testing;

use chain::{ChainClient, RpcChainClient, TransactionSigner, WalletSigner};
use cli::{Cli, Command};
use compiler::{write_verification_input, SolcCompiler};
use config::{NetworkRegistry, Settings};
use coordination::Runner;
use error::DeployerError;
use formula::{formula_path, Formula};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.json);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        let code = e
            .downcast_ref::<DeployerError>()
            .map(DeployerError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting Formula Deployer v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Command::Deploy {
            formula,
            network,
            report,
        } => deploy(&settings, &formula, &network, report.as_deref()).await,
        Command::VerificationInput { contract, output } => {
            let output = output.unwrap_or_else(|| settings.compiler.verification_output.clone());
            write_verification_input(&contract, settings.compiler.optimizer_runs, &output)?;
            Ok(())
        }
    }
}

async fn deploy(
    settings: &Settings,
    formula: &str,
    network_id: &str,
    report: Option<&Path>,
) -> Result<()> {
    let registry = NetworkRegistry::load(&settings.deployer.networks_file)?;
    let network = registry.get(network_id)?.clone();
    info!("Loaded {} networks, using {}", registry.len(), network.display_name);

    let signer = WalletSigner::from_env(&settings.deployer.private_key_env)?;

    let formula = Formula::load(&formula_path(&settings.deployer.formulas_dir, formula))?;
    info!(
        "Loaded formula '{}' with {} steps",
        formula.name,
        formula.steps().len()
    );

    let client = RpcChainClient::new(
        network.clone(),
        settings.transactions.receipt_poll_interval(),
    )?;
    let chain_id = client.chain_id().await.map_err(|e| {
        DeployerError::Config(format!("Cannot reach {}: {}", network.rpc_url, e))
    })?;
    info!(
        "Connected to {} at {} (chain id {}), deployer {:?}",
        client.network().display_name,
        network.rpc_url,
        chain_id,
        signer.address()
    );

    let signer = signer.with_chain_id(chain_id);

    let runner = Runner::new(
        Arc::new(client),
        Arc::new(signer),
        Arc::new(SolcCompiler::new(&settings.compiler.solc_path)),
        &settings.transactions,
        chain_id,
        network.id.as_str(),
        settings.deployer.deployer_name.as_str(),
    );

    let run = runner.run(&formula).await?;

    for (name, address) in &run.context {
        info!("{}: {:?}", name, address);
    }

    if let Some(path) = report {
        std::fs::write(path, serde_json::to_string_pretty(&run)?)?;
        info!("Run report written to {}", path.display());
    }

    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,formula_deployer=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
