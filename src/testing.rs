//! In-memory chain, signer and compiler used by unit tests

use crate::chain::{ChainClient, LatestBlock, TransactionSigner};
use crate::compiler::{CompiledContract, ContractCompiler};
use crate::error::{DeployerError, DeployerResult};

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H160, H256, U256, U64};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const CHAIN_ID: u64 = 31337;

/// Gas the stub reports for every estimate
pub const STUB_GAS_ESTIMATE: u64 = 500_000;

/// Address the stub assigns to the n-th contract creation (0-based)
pub fn stub_contract_address(index: u64) -> Address {
    Address::from_low_u64_be(0xC0DE_0000 + index)
}

#[derive(Debug, Default)]
struct ChainState {
    conflicts_remaining: u32,
    submitted_nonces: Vec<u64>,
    submitted_gas_prices: Vec<U256>,
    receipts: HashMap<H256, TransactionReceipt>,
    creations: u64,
    estimates: u32,
}

/// A chain that accepts everything unless told otherwise
pub struct StubChain {
    starting_nonce: u64,
    base_fee: Option<U256>,
    gas_price: U256,
    send_error: Option<String>,
    confirm: bool,
    revert: bool,
    state: Mutex<ChainState>,
}

impl StubChain {
    pub fn new(starting_nonce: u64) -> Self {
        Self {
            starting_nonce,
            base_fee: Some(U256::from(1_000_000_000u64)),
            gas_price: U256::from(1_000_000_000u64),
            send_error: None,
            confirm: true,
            revert: false,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Reject the next `n` submissions as stale-nonce conflicts
    pub fn with_nonce_conflicts(self, n: u32) -> Self {
        self.state.lock().unwrap().conflicts_remaining = n;
        self
    }

    /// Reject every submission with `message`
    pub fn with_send_error(mut self, message: &str) -> Self {
        self.send_error = Some(message.to_string());
        self
    }

    pub fn without_base_fee(mut self, gas_price: U256) -> Self {
        self.base_fee = None;
        self.gas_price = gas_price;
        self
    }

    pub fn never_confirm(mut self) -> Self {
        self.confirm = false;
        self
    }

    pub fn revert_all(mut self) -> Self {
        self.revert = true;
        self
    }

    /// Nonces of every submission attempt, accepted or not
    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.state.lock().unwrap().submitted_nonces.clone()
    }

    /// Gas price (max fee for EIP-1559) of every submission attempt
    pub fn submitted_gas_prices(&self) -> Vec<U256> {
        self.state.lock().unwrap().submitted_gas_prices.clone()
    }

    pub fn estimate_calls(&self) -> u32 {
        self.state.lock().unwrap().estimates
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn chain_id(&self) -> DeployerResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn get_transaction_count(&self, _address: Address) -> DeployerResult<u64> {
        let state = self.state.lock().unwrap();
        let confirmed = state.receipts.len() as u64;
        Ok(self.starting_nonce + confirmed)
    }

    async fn get_gas_price(&self) -> DeployerResult<U256> {
        Ok(self.gas_price)
    }

    async fn get_latest_block(&self) -> DeployerResult<LatestBlock> {
        Ok(LatestBlock {
            number: 1,
            base_fee_per_gas: self.base_fee,
        })
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> DeployerResult<U256> {
        self.state.lock().unwrap().estimates += 1;
        Ok(U256::from(STUB_GAS_ESTIMATE))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> DeployerResult<H256> {
        let (is_creation, nonce, gas_price) = RecordingSigner::decode(&raw);
        let mut state = self.state.lock().unwrap();
        state.submitted_nonces.push(nonce);
        state.submitted_gas_prices.push(gas_price);

        if let Some(message) = &self.send_error {
            return Err(crate::chain::classify_send_error(message));
        }
        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            return Err(crate::chain::classify_send_error("nonce too low"));
        }

        let tx_hash = H256::from_low_u64_be(state.submitted_nonces.len() as u64);
        let contract_address = if is_creation {
            let address = stub_contract_address(state.creations);
            state.creations += 1;
            Some(address)
        } else {
            None
        };

        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(100 + state.receipts.len() as u64)),
            gas_used: Some(U256::from(21_000)),
            contract_address,
            status: Some(U64::from(if self.revert { 0 } else { 1 })),
            ..Default::default()
        };
        state.receipts.insert(tx_hash, receipt);

        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        _timeout: Duration,
    ) -> DeployerResult<TransactionReceipt> {
        if !self.confirm {
            return Err(DeployerError::Timeout {
                operation: format!("receipt of {:?}", tx_hash),
            });
        }
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| DeployerError::Transaction("unknown transaction".to_string()))
    }
}

/// Signer whose "signature" encodes what the stub chain needs to see:
/// creation flag, nonce and gas price
pub struct RecordingSigner;

impl RecordingSigner {
    pub const ADDRESS: Address = H160([0xd0; 20]);

    pub fn new() -> Self {
        Self
    }

    fn decode(raw: &Bytes) -> (bool, u64, U256) {
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&raw[1..9]);
        (
            raw[0] == 1,
            u64::from_be_bytes(nonce),
            U256::from_big_endian(&raw[9..41]),
        )
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    fn address(&self) -> Address {
        Self::ADDRESS
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> DeployerResult<Bytes> {
        let nonce = tx.nonce().map(|n| n.as_u64()).unwrap_or_default();
        let mut raw = vec![u8::from(tx.to().is_none())];
        raw.extend_from_slice(&nonce.to_be_bytes());
        let mut gas_price = [0u8; 32];
        tx.gas_price().unwrap_or_default().to_big_endian(&mut gas_price);
        raw.extend_from_slice(&gas_price);
        Ok(Bytes::from(raw))
    }
}

/// Compiler returning canned artifacts
#[derive(Default)]
pub struct StubCompiler {
    contracts: HashMap<String, Abi>,
    compiled: Mutex<Vec<String>>,
}

impl StubCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contract(mut self, name: &str, abi_json: &str) -> Self {
        let abi: Abi = serde_json::from_str(abi_json).expect("valid test ABI");
        self.contracts.insert(name.to_string(), abi);
        self
    }

    pub fn compiled(&self) -> Vec<String> {
        self.compiled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContractCompiler for StubCompiler {
    async fn compile(&self, _source: &Path, contract_name: &str) -> DeployerResult<CompiledContract> {
        self.compiled.lock().unwrap().push(contract_name.to_string());
        let abi = self.contracts.get(contract_name).cloned().ok_or_else(|| {
            DeployerError::Compilation(format!("contract {} not found", contract_name))
        })?;
        Ok(CompiledContract {
            abi,
            bytecode: Bytes::from(vec![0x60, 0x80, 0x60, 0x40]),
        })
    }
}

/// ABI of a contract with no constructor arguments and one setter
pub const TOKEN_ABI: &str = r#"[
    {"type": "function", "name": "mint", "stateMutability": "nonpayable",
     "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}],
     "outputs": []}
]"#;

/// ABI of a contract taking an address in its constructor
pub const VAULT_ABI: &str = r#"[
    {"type": "constructor", "stateMutability": "nonpayable",
     "inputs": [{"name": "token", "type": "address"}, {"name": "label", "type": "string"}]},
    {"type": "function", "name": "setToken", "stateMutability": "nonpayable",
     "inputs": [{"name": "token", "type": "address"}], "outputs": []},
    {"type": "function", "name": "setNote", "stateMutability": "nonpayable",
     "inputs": [{"name": "note", "type": "string"}], "outputs": []}
]"#;
