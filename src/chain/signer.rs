//! Transaction signing

use crate::error::{DeployerError, DeployerResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes};

/// Holds the deploying account's key material
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `tx` and return the raw bytes ready for broadcast
    async fn sign_transaction(&self, tx: &TypedTransaction) -> DeployerResult<Bytes>;
}

/// Signer backed by a private key held in memory
#[derive(Debug, Clone)]
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Load the key from an environment variable
    pub fn from_env(var: &str) -> DeployerResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            DeployerError::Wallet(format!("No private key configured. Set {}", var))
        })?;
        Self::from_key(key.trim())
    }

    pub fn from_key(key: &str) -> DeployerResult<Self> {
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| DeployerError::Wallet(format!("Invalid private key: {}", e)))?;
        Ok(Self { wallet })
    }

    /// Bind signatures to a chain (EIP-155)
    pub fn with_chain_id(self, chain_id: u64) -> Self {
        Self {
            wallet: self.wallet.with_chain_id(chain_id),
        }
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> DeployerResult<Bytes> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| DeployerError::Transaction(format!("Failed to sign transaction: {}", e)))?;
        Ok(tx.rlp_signed(&signature))
    }
}
