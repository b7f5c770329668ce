//! Contract compilation
//!
//! Turns a Solidity source reference and contract name into ABI and creation
//! bytecode by running `solc`. Any failure here is fatal for the run.

pub mod verification;

pub use verification::write_verification_input;

use crate::error::{DeployerError, DeployerResult};

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Compiler output for a single contract
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub abi: Abi,
    pub bytecode: Bytes,
}

#[async_trait]
pub trait ContractCompiler: Send + Sync {
    async fn compile(&self, source: &Path, contract_name: &str) -> DeployerResult<CompiledContract>;
}

/// Compiles through the `solc` command line
pub struct SolcCompiler {
    solc_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    contracts: HashMap<String, CombinedContract>,
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    /// A JSON array on current solc, a JSON-encoded string on older releases
    abi: Value,
    bin: String,
}

impl SolcCompiler {
    pub fn new(solc_path: impl Into<PathBuf>) -> Self {
        Self {
            solc_path: solc_path.into(),
        }
    }
}

#[async_trait]
impl ContractCompiler for SolcCompiler {
    async fn compile(&self, source: &Path, contract_name: &str) -> DeployerResult<CompiledContract> {
        if !source.is_file() {
            return Err(DeployerError::Compilation(format!(
                "source file {} not found",
                source.display()
            )));
        }

        info!("Compiling {} from {}", contract_name, source.display());

        let output = Command::new(&self.solc_path)
            .arg("--combined-json")
            .arg("abi,bin")
            .arg(source)
            .output()
            .await
            .map_err(|e| {
                DeployerError::Compilation(format!(
                    "failed to run {}: {}",
                    self.solc_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(DeployerError::Compilation(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        extract_contract(&stdout, source, contract_name)
    }
}

/// Pick one contract out of `solc --combined-json abi,bin` output
pub fn extract_contract(
    combined_json: &str,
    source: &Path,
    contract_name: &str,
) -> DeployerResult<CompiledContract> {
    let combined: CombinedJson = serde_json::from_str(combined_json)
        .map_err(|e| DeployerError::Compilation(format!("unreadable solc output: {}", e)))?;

    let exact_key = format!("{}:{}", source.display(), contract_name);
    let suffix = format!(":{}", contract_name);

    let contract = combined
        .contracts
        .get(&exact_key)
        .or_else(|| {
            combined
                .contracts
                .iter()
                .find(|(key, _)| key.ends_with(&suffix))
                .map(|(_, c)| c)
        })
        .ok_or_else(|| {
            DeployerError::Compilation(format!(
                "contract {} not found in {}",
                contract_name,
                source.display()
            ))
        })?;

    let abi: Abi = match &contract.abi {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => serde_json::from_value(other.clone()),
    }
    .map_err(|e| DeployerError::Compilation(format!("invalid ABI for {}: {}", contract_name, e)))?;

    if contract.bin.is_empty() {
        return Err(DeployerError::Compilation(format!(
            "{} has no bytecode (abstract contract or interface?)",
            contract_name
        )));
    }

    let bytecode = hex::decode(contract.bin.trim_start_matches("0x"))
        .map_err(|e| DeployerError::Compilation(format!("invalid bytecode: {}", e)))?;

    debug!("{}: {} bytes of bytecode", contract_name, bytecode.len());

    Ok(CompiledContract {
        abi,
        bytecode: Bytes::from(bytecode),
    })
}
