//! Fee strategy selection and gas-limit estimation

use super::TxKind;
use crate::chain::ChainClient;
use crate::config::TransactionConfig;
use crate::error::DeployerResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use serde::Serialize;
use tracing::{debug, info};

/// Fee plan applied to every transaction of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GasPlan {
    Legacy {
        gas_price: U256,
    },
    Dynamic {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// Pricing knobs for fee plans and gas limits
#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Tip added on top of the base fee
    priority_fee: U256,
    /// Legacy gas price as a percentage of the observed price
    legacy_price_percent: u64,
    /// Deploy gas limit as a percentage of the estimate
    deploy_headroom_percent: u64,
}

impl GasPolicy {
    pub fn new(priority_fee: U256, legacy_price_percent: u64, deploy_headroom_percent: u64) -> Self {
        Self {
            priority_fee,
            legacy_price_percent,
            deploy_headroom_percent,
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::new(
            U256::from(config.priority_fee_gwei) * U256::exp10(9),
            config.legacy_gas_price_percent,
            config.deploy_gas_headroom_percent,
        )
    }

    /// Plan for a network whose latest block reports a base fee
    pub fn dynamic_plan(&self, base_fee: U256) -> GasPlan {
        GasPlan::Dynamic {
            max_fee_per_gas: base_fee + self.priority_fee,
            max_priority_fee_per_gas: self.priority_fee,
        }
    }

    /// Plan for a network without a base fee
    pub fn legacy_plan(&self, observed_gas_price: U256) -> GasPlan {
        GasPlan::Legacy {
            gas_price: observed_gas_price * self.legacy_price_percent / 100,
        }
    }

    /// Probe the network once and pick the run's fee plan
    pub async fn select_plan(&self, client: &dyn ChainClient) -> DeployerResult<GasPlan> {
        let latest = client.get_latest_block().await?;

        let plan = match latest.base_fee_per_gas {
            Some(base_fee) => self.dynamic_plan(base_fee),
            None => self.legacy_plan(client.get_gas_price().await?),
        };

        info!("Gas plan selected at block {}: {:?}", latest.number, plan);
        Ok(plan)
    }

    /// Gas limit for a transaction: the override if given, else the
    /// estimate with headroom for deployments.
    pub async fn gas_limit(
        &self,
        client: &dyn ChainClient,
        request: &TypedTransaction,
        kind: TxKind,
        limit_override: Option<u64>,
    ) -> DeployerResult<U256> {
        if let Some(limit) = limit_override {
            debug!("Using gas limit override {}", limit);
            return Ok(U256::from(limit));
        }

        let estimate = client.estimate_gas(request).await?;
        let limit = self.apply_headroom(estimate, kind);
        debug!("Estimated gas {} -> limit {}", estimate, limit);
        Ok(limit)
    }

    pub fn apply_headroom(&self, estimate: U256, kind: TxKind) -> U256 {
        match kind {
            TxKind::Deploy => estimate * self.deploy_headroom_percent / 100,
            TxKind::Call => estimate,
        }
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::from_config(&TransactionConfig::default())
    }
}
