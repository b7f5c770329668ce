//! Transaction construction, fee pricing and nonce-safe submission

mod gas;
mod nonce;

pub use gas::{GasPlan, GasPolicy};
pub use nonce::{NonceController, RetryPolicy};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, H256, U256};
use serde::Serialize;

/// What a transaction does, for gas-limit headroom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deploy,
    Call,
}

/// Everything about a transaction except its nonce and fees
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionTemplate {
    pub kind: TxKind,
    pub from: Address,
    /// `None` creates a contract
    pub to: Option<Address>,
    pub data: Bytes,
    pub gas_limit: U256,
}

impl TransactionTemplate {
    /// Request used for gas estimation: no nonce, no fees, no limit
    pub fn estimation_request(from: Address, to: Option<Address>, data: &Bytes) -> TypedTransaction {
        let mut tx = TransactionRequest::new().from(from).data(data.clone());
        if let Some(to) = to {
            tx = tx.to(to);
        }
        tx.into()
    }

    /// Materialize a transaction for one submission attempt
    pub fn build(&self, nonce: u64, chain_id: u64, plan: &GasPlan) -> TypedTransaction {
        match plan {
            GasPlan::Legacy { gas_price } => {
                let mut tx = TransactionRequest::new()
                    .from(self.from)
                    .data(self.data.clone())
                    .nonce(nonce)
                    .gas(self.gas_limit)
                    .gas_price(*gas_price)
                    .chain_id(chain_id);
                if let Some(to) = self.to {
                    tx = tx.to(to);
                }
                TypedTransaction::Legacy(tx)
            }
            GasPlan::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut tx = Eip1559TransactionRequest::new()
                    .from(self.from)
                    .data(self.data.clone())
                    .nonce(nonce)
                    .gas(self.gas_limit)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(chain_id);
                if let Some(to) = self.to {
                    tx = tx.to(to);
                }
                TypedTransaction::Eip1559(tx)
            }
        }
    }
}

/// Result of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionOutcome {
    pub tx_hash: H256,
    /// Nonce of the submission that was included
    pub nonce: u64,
    pub attempts: u32,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub contract_address: Option<Address>,
}
