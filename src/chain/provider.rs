//! Chain client backed by an ethers HTTP provider

use super::{classify_send_error, ChainClient, LatestBlock};
use crate::config::NetworkConfig;
use crate::error::{DeployerError, DeployerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcClient, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// JSON-RPC client for one network
pub struct RpcChainClient<P = Http> {
    /// Network this client talks to
    network: NetworkConfig,
    provider: Provider<P>,
    /// Interval between receipt polls
    poll_interval: Duration,
}

impl RpcChainClient<Http> {
    /// Create a new client. No request is made until first use.
    pub fn new(network: NetworkConfig, poll_interval: Duration) -> DeployerResult<Self> {
        let provider = Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
            DeployerError::Config(format!("Invalid RPC URL {}: {}", network.rpc_url, e))
        })?;

        debug!("Created HTTP provider for {}: {}", network.id, network.rpc_url);

        Ok(Self::with_provider(network, provider, poll_interval))
    }
}

impl<P: JsonRpcClient> RpcChainClient<P> {
    pub fn with_provider(
        network: NetworkConfig,
        provider: Provider<P>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            network,
            provider: provider.interval(poll_interval),
            poll_interval,
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn connection_error(&self, e: impl std::fmt::Display) -> DeployerError {
        DeployerError::ChainConnection(format!("{}: {}", self.network.id, e))
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainClient for RpcChainClient<P> {
    async fn chain_id(&self) -> DeployerResult<u64> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| self.connection_error(e))
    }

    async fn get_transaction_count(&self, address: Address) -> DeployerResult<u64> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map(|n| n.as_u64())
            .map_err(|e| self.connection_error(e))
    }

    async fn get_gas_price(&self) -> DeployerResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| DeployerError::GasEstimation(e.to_string()))
    }

    async fn get_latest_block(&self) -> DeployerResult<LatestBlock> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| self.connection_error(e))?
            .ok_or_else(|| self.connection_error("no latest block"))?;

        Ok(LatestBlock {
            number: block.number.map(|n| n.as_u64()).unwrap_or_default(),
            base_fee_per_gas: block.base_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> DeployerResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| DeployerError::GasEstimation(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> DeployerResult<H256> {
        match self.provider.send_raw_transaction(raw).await {
            Ok(pending) => Ok(pending.tx_hash()),
            Err(e) => Err(classify_send_error(&e.to_string())),
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        wait: Duration,
    ) -> DeployerResult<TransactionReceipt> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => tokio::time::sleep(self.poll_interval).await,
                    Err(e) => return Err(self.connection_error(e)),
                }
            }
        };

        timeout(wait, poll).await.map_err(|_| DeployerError::Timeout {
            operation: format!("receipt of {:?}", tx_hash),
        })?
    }
}
