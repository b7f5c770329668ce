//! Run-scoped record of deployed contracts

use crate::error::{DeployerError, DeployerResult};

use ethers::abi::Abi;
use ethers::types::Address;
use std::collections::BTreeMap;

/// What the run knows about one symbolic name
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub address: Address,
    /// Present for deployed contracts, absent for plain accounts
    pub abi: Option<Abi>,
}

/// Symbolic name -> address (and interface) for the current run.
///
/// Entries are only ever added; a name once recorded keeps its value until
/// the run ends.
#[derive(Debug, Clone, Default)]
pub struct DeploymentContext {
    entries: BTreeMap<String, ContextEntry>,
}

impl DeploymentContext {
    /// Context holding only the signer's own address
    pub fn seeded(deployer_name: &str, deployer: Address) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            deployer_name.to_string(),
            ContextEntry {
                address: deployer,
                abi: None,
            },
        );
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ContextEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Record a new name. Existing names are never overwritten.
    pub fn record(&mut self, name: &str, entry: ContextEntry) -> DeployerResult<()> {
        if self.entries.contains_key(name) {
            return Err(DeployerError::ContractAlreadyDeployed {
                name: name.to_string(),
            });
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Name -> address view for reports and logs
    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.address))
            .collect()
    }
}
