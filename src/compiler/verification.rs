//! Standard-JSON compiler input for block explorer verification.
//!
//! The settings here must match what the contract was deployed with.

use crate::error::{DeployerError, DeployerResult};

use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

/// Build the standard-JSON input for a single source file
pub fn standard_json_input(contract_path: &Path, source: &str, optimizer_runs: u32) -> Value {
    json!({
        "language": "Solidity",
        "sources": {
            (contract_path.display().to_string()): {
                "content": source
            }
        },
        "settings": {
            "optimizer": {
                "enabled": true,
                "runs": optimizer_runs
            },
            "outputSelection": {
                "*": {
                    "*": ["*"]
                }
            }
        }
    })
}

/// Write the verification input for `contract_path` to `output`
pub fn write_verification_input(
    contract_path: &Path,
    optimizer_runs: u32,
    output: &Path,
) -> DeployerResult<()> {
    let source = std::fs::read_to_string(contract_path).map_err(|_| {
        DeployerError::Config(format!("Contract file {} not found", contract_path.display()))
    })?;

    let input = standard_json_input(contract_path, &source, optimizer_runs);
    std::fs::write(output, serde_json::to_string_pretty(&input)?)?;

    info!(
        "Wrote verification input for {} to {}",
        contract_path.display(),
        output.display()
    );
    Ok(())
}
