//! Nonce management for reliable transaction submission
//!
//! Each step starts from the nonce the node reports for the deployer and
//! walks a fixed state machine:
//!
//! ```text
//! Fetch -> Build -> Sign -> Submit -> AwaitConfirmation -> Done
//!                             |
//!                             +-> Retry -> Build   (nonce + 1)
//! ```
//!
//! Only sequence-number conflicts reported at `Submit` lead to `Retry`.
//! Every other failure, and running out of attempts, ends in `Fatal`.

use super::{GasPlan, TransactionOutcome, TransactionTemplate};
use crate::chain::{ChainClient, TransactionSigner};
use crate::config::TransactionConfig;
use crate::error::{DeployerError, DeployerResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionReceipt, H256, U64};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Attempt ceiling and timings for one step
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total submission attempts, the first one included
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub confirmation_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TransactionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
            confirmation_timeout: config.confirmation_timeout(),
        }
    }
}

/// States of a single step's submission
#[derive(Debug)]
pub enum AttemptState {
    Fetch,
    Build,
    Sign(TypedTransaction),
    Submit(Bytes),
    AwaitConfirmation(H256),
    Retry(DeployerError),
    Done(H256, TransactionReceipt),
    Fatal(DeployerError),
}

impl AttemptState {
    fn name(&self) -> &'static str {
        match self {
            AttemptState::Fetch => "fetch",
            AttemptState::Build => "build",
            AttemptState::Sign(_) => "sign",
            AttemptState::Submit(_) => "submit",
            AttemptState::AwaitConfirmation(_) => "await_confirmation",
            AttemptState::Retry(_) => "retry",
            AttemptState::Done(..) => "done",
            AttemptState::Fatal(_) => "fatal",
        }
    }
}

/// Drives one transaction from nonce fetch to confirmation
pub struct NonceController<'a> {
    client: &'a dyn ChainClient,
    signer: &'a dyn TransactionSigner,
    policy: &'a RetryPolicy,
    chain_id: u64,
}

impl<'a> NonceController<'a> {
    pub fn new(
        client: &'a dyn ChainClient,
        signer: &'a dyn TransactionSigner,
        policy: &'a RetryPolicy,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            signer,
            policy,
            chain_id,
        }
    }

    /// Submit `template` for `step` and wait for it to be mined
    pub async fn execute(
        &self,
        step: u32,
        template: &TransactionTemplate,
        plan: &GasPlan,
    ) -> DeployerResult<TransactionOutcome> {
        let from = self.signer.address();
        let mut nonce = 0u64;
        let mut attempt = 0u32;
        let mut state = AttemptState::Fetch;

        loop {
            debug!("Step {} state: {}", step, state.name());

            state = match state {
                AttemptState::Fetch => match self.client.get_transaction_count(from).await {
                    Ok(current) => {
                        nonce = current;
                        debug!("Step {} starting at nonce {}", step, nonce);
                        AttemptState::Build
                    }
                    Err(e) => AttemptState::Fatal(e),
                },

                AttemptState::Build => {
                    attempt += 1;
                    AttemptState::Sign(template.build(nonce, self.chain_id, plan))
                }

                AttemptState::Sign(tx) => match self.signer.sign_transaction(&tx).await {
                    Ok(raw) => AttemptState::Submit(raw),
                    Err(e) => AttemptState::Fatal(e),
                },

                AttemptState::Submit(raw) => match self.client.send_raw_transaction(raw).await {
                    Ok(tx_hash) => {
                        info!(
                            "Step {} transaction sent: {:?} (nonce {}, attempt {}/{})",
                            step, tx_hash, nonce, attempt, self.policy.max_attempts
                        );
                        AttemptState::AwaitConfirmation(tx_hash)
                    }
                    Err(e) if e.is_retryable() => AttemptState::Retry(e),
                    Err(e) => AttemptState::Fatal(e),
                },

                AttemptState::Retry(e) => {
                    warn!(
                        "Step {} attempt {}/{} with nonce {} rejected: {}",
                        step, attempt, self.policy.max_attempts, nonce, e
                    );
                    if attempt >= self.policy.max_attempts {
                        AttemptState::Fatal(DeployerError::RetriesExhausted {
                            step,
                            attempts: attempt,
                        })
                    } else {
                        tokio::time::sleep(self.policy.retry_delay).await;
                        nonce += 1;
                        AttemptState::Build
                    }
                }

                AttemptState::AwaitConfirmation(tx_hash) => {
                    match self
                        .client
                        .wait_for_receipt(tx_hash, self.policy.confirmation_timeout)
                        .await
                    {
                        Ok(receipt) if receipt.status == Some(U64::zero()) => {
                            AttemptState::Fatal(DeployerError::Reverted {
                                tx_hash: format!("{:?}", tx_hash),
                            })
                        }
                        Ok(receipt) => AttemptState::Done(tx_hash, receipt),
                        Err(e) => AttemptState::Fatal(e),
                    }
                }

                AttemptState::Done(tx_hash, receipt) => {
                    let outcome = TransactionOutcome {
                        tx_hash,
                        nonce,
                        attempts: attempt,
                        block_number: receipt.block_number.map(|b| b.as_u64()),
                        gas_used: receipt.gas_used,
                        contract_address: receipt.contract_address,
                    };
                    info!(
                        "Step {} confirmed in block {:?}, gas used {:?}",
                        step, outcome.block_number, outcome.gas_used
                    );
                    return Ok(outcome);
                }

                AttemptState::Fatal(e) => {
                    error!("Step {} failed at nonce {}: {}", step, nonce, e);
                    return Err(e);
                }
            };
        }
    }
}
