//! Chain module - the boundary to the target network
//!
//! This module provides:
//! - The `ChainClient` trait the engine talks to
//! - An ethers HTTP implementation of it
//! - Classification of RPC submission errors into transient and fatal
//! - The `TransactionSigner` boundary and a local-wallet implementation

pub mod provider;
pub mod signer;

pub use provider::RpcChainClient;
pub use signer::{TransactionSigner, WalletSigner};

use crate::error::{DeployerError, DeployerResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::time::Duration;

/// Fields of the most recent block the engine cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestBlock {
    pub number: u64,
    pub base_fee_per_gas: Option<U256>,
}

/// Operations the engine needs from a network node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> DeployerResult<u64>;

    /// Next transaction sequence number for `address`
    async fn get_transaction_count(&self, address: Address) -> DeployerResult<u64>;

    async fn get_gas_price(&self) -> DeployerResult<U256>;

    async fn get_latest_block(&self) -> DeployerResult<LatestBlock>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> DeployerResult<U256>;

    /// Broadcast a signed transaction.
    ///
    /// Sequence-number conflicts come back as `DeployerError::NonceConflict`.
    async fn send_raw_transaction(&self, raw: Bytes) -> DeployerResult<H256>;

    /// Wait until `tx_hash` is included, failing with `Timeout` after `timeout`
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> DeployerResult<TransactionReceipt>;
}

/// Node messages that mean the nonce we used is stale or already taken
const NONCE_CONFLICT_MARKERS: &[&str] = &[
    "nonce too low",
    "nonce has already been used",
    "replacement transaction underpriced",
];

/// Classify a submission failure reported by the node
pub fn classify_send_error(message: &str) -> DeployerError {
    let lowered = message.to_lowercase();

    if NONCE_CONFLICT_MARKERS.iter().any(|m| lowered.contains(m)) {
        DeployerError::NonceConflict(message.to_string())
    } else {
        DeployerError::Transaction(message.to_string())
    }
}
