//! Execution of a single formula step

use super::context::{ContextEntry, DeploymentContext};
use super::encode::tokenize_args;
use super::resolver::resolve_args;
use crate::chain::{ChainClient, TransactionSigner};
use crate::compiler::ContractCompiler;
use crate::error::{DeployerError, DeployerResult};
use crate::formula::{CallStep, DeployStep};
use crate::tx::{
    GasPlan, GasPolicy, NonceController, RetryPolicy, TransactionOutcome, TransactionTemplate,
    TxKind,
};

use ethers::abi::{Abi, Function};
use ethers::types::Bytes;
use serde_json::Value;
use tracing::info;

/// Builds and drives the transaction for one step
pub struct StepExecutor<'a> {
    client: &'a dyn ChainClient,
    signer: &'a dyn TransactionSigner,
    compiler: &'a dyn ContractCompiler,
    gas_policy: &'a GasPolicy,
    retry_policy: &'a RetryPolicy,
    chain_id: u64,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        client: &'a dyn ChainClient,
        signer: &'a dyn TransactionSigner,
        compiler: &'a dyn ContractCompiler,
        gas_policy: &'a GasPolicy,
        retry_policy: &'a RetryPolicy,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            signer,
            compiler,
            gas_policy,
            retry_policy,
            chain_id,
        }
    }

    /// Deploy a contract and record it in `context` under its name
    pub async fn deploy(
        &self,
        number: u32,
        step: &DeployStep,
        plan: &GasPlan,
        context: &mut DeploymentContext,
    ) -> DeployerResult<TransactionOutcome> {
        if context.contains(&step.contract_name) {
            return Err(DeployerError::ContractAlreadyDeployed {
                name: step.contract_name.clone(),
            });
        }

        let args = resolve_args(&step.constructor_args, context)?;
        let compiled = self
            .compiler
            .compile(&step.source, &step.contract_name)
            .await?;
        let data = encode_deployment(&compiled.abi, &compiled.bytecode, &args)?;

        let outcome = self
            .submit(number, TxKind::Deploy, None, data, step.gas_limit_override, plan)
            .await?;

        let address = outcome.contract_address.ok_or_else(|| {
            DeployerError::Transaction(format!(
                "receipt for {:?} has no contract address",
                outcome.tx_hash
            ))
        })?;

        context.record(
            &step.contract_name,
            ContextEntry {
                address,
                abi: Some(compiled.abi),
            },
        )?;

        info!(
            "Contract '{}' deployed at {:?} (tx {:?})",
            step.contract_name, address, outcome.tx_hash
        );
        Ok(outcome)
    }

    /// Call a function on a contract deployed by an earlier step
    pub async fn call(
        &self,
        number: u32,
        step: &CallStep,
        plan: &GasPlan,
        context: &DeploymentContext,
    ) -> DeployerResult<TransactionOutcome> {
        let args = resolve_args(&step.args, context)?;

        let entry = context
            .get(&step.contract_name)
            .ok_or_else(|| DeployerError::UnknownContract {
                name: step.contract_name.clone(),
            })?;
        let abi = entry.abi.as_ref().ok_or_else(|| {
            DeployerError::AbiEncoding(format!(
                "'{}' is an account, not a contract with an ABI",
                step.contract_name
            ))
        })?;

        let function = select_function(abi, &step.function_name, &args)?;
        let tokens = tokenize_args(&function.inputs, &args)?;
        let data = function
            .encode_input(&tokens)
            .map_err(|e| DeployerError::AbiEncoding(e.to_string()))?;

        let outcome = self
            .submit(
                number,
                TxKind::Call,
                Some(entry.address),
                Bytes::from(data),
                step.gas_limit_override,
                plan,
            )
            .await?;

        info!(
            "Function '{}' on '{}' executed (tx {:?})",
            step.function_name, step.contract_name, outcome.tx_hash
        );
        Ok(outcome)
    }

    async fn submit(
        &self,
        number: u32,
        kind: TxKind,
        to: Option<ethers::types::Address>,
        data: Bytes,
        gas_limit_override: Option<u64>,
        plan: &GasPlan,
    ) -> DeployerResult<TransactionOutcome> {
        let from = self.signer.address();
        let request = TransactionTemplate::estimation_request(from, to, &data);
        let gas_limit = self
            .gas_policy
            .gas_limit(self.client, &request, kind, gas_limit_override)
            .await?;

        let template = TransactionTemplate {
            kind,
            from,
            to,
            data,
            gas_limit,
        };

        NonceController::new(self.client, self.signer, self.retry_policy, self.chain_id)
            .execute(number, &template, plan)
            .await
    }
}

/// Creation bytecode followed by the encoded constructor arguments
fn encode_deployment(abi: &Abi, bytecode: &Bytes, args: &[Value]) -> DeployerResult<Bytes> {
    match abi.constructor() {
        Some(constructor) => {
            let tokens = tokenize_args(&constructor.inputs, args)?;
            constructor
                .encode_input(bytecode.to_vec(), &tokens)
                .map(Bytes::from)
                .map_err(|e| DeployerError::AbiEncoding(e.to_string()))
        }
        None if args.is_empty() => Ok(bytecode.clone()),
        None => Err(DeployerError::AbiEncoding(format!(
            "contract has no constructor but {} arguments were given",
            args.len()
        ))),
    }
}

/// Pick the function named `name`, using the argument count to choose
/// between overloads
fn select_function<'a>(abi: &'a Abi, name: &str, args: &[Value]) -> DeployerResult<&'a Function> {
    let candidates = abi
        .functions_by_name(name)
        .map_err(|_| DeployerError::AbiEncoding(format!("no function named '{}'", name)))?;

    candidates
        .iter()
        .find(|f| f.inputs.len() == args.len())
        .ok_or_else(|| {
            DeployerError::AbiEncoding(format!(
                "no overload of '{}' takes {} arguments",
                name,
                args.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::testing::{
        stub_contract_address, RecordingSigner, StubChain, StubCompiler, CHAIN_ID, TOKEN_ABI,
        VAULT_ABI,
    };
    use ethers::types::{Address, U256};
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn policies() -> (GasPolicy, RetryPolicy) {
        (
            GasPolicy::default(),
            RetryPolicy {
                max_attempts: 3,
                retry_delay: Duration::from_millis(1),
                confirmation_timeout: Duration::from_secs(1),
            },
        )
    }

    fn plan() -> GasPlan {
        GasPlan::Legacy {
            gas_price: U256::from(1_000),
        }
    }

    fn deploy_step(name: &str, args: Vec<Value>) -> DeployStep {
        DeployStep {
            contract_name: name.to_string(),
            source: PathBuf::from(format!("contracts/{}.sol", name)),
            constructor_args: args,
            gas_limit_override: None,
        }
    }

    fn call_step(name: &str, function: &str, args: Vec<Value>) -> CallStep {
        CallStep {
            contract_name: name.to_string(),
            function_name: function.to_string(),
            args,
            gas_limit_override: None,
        }
    }

    #[tokio::test]
    async fn deploy_records_address_and_abi() {
        let chain = StubChain::new(0);
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new().with_contract("Token", TOKEN_ABI);
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&chain, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        let outcome = executor
            .deploy(1, &deploy_step("Token", vec![]), &plan(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome.contract_address, Some(stub_contract_address(0)));
        let entry = ctx.get("Token").unwrap();
        assert_eq!(entry.address, stub_contract_address(0));
        assert!(entry.abi.as_ref().unwrap().function("mint").is_ok());
        assert_eq!(ctx.len(), 2);
    }

    #[tokio::test]
    async fn deploy_uses_resolved_constructor_args() {
        let chain = StubChain::new(0);
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new().with_contract("Vault", VAULT_ABI);
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&chain, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        executor
            .deploy(
                1,
                &deploy_step("Vault", vec![json!("{{deployer.address}}"), json!("main")]),
                &plan(),
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(ctx.contains("Vault"));
    }

    #[tokio::test]
    async fn duplicate_deploy_rejected_before_compiling() {
        let mut client = MockChainClient::new();
        client.expect_send_raw_transaction().never();
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new().with_contract("Token", TOKEN_ABI);
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&client, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);
        ctx.record(
            "Token",
            ContextEntry {
                address: Address::repeat_byte(1),
                abi: None,
            },
        )
        .unwrap();

        let err = executor
            .deploy(2, &deploy_step("Token", vec![]), &plan(), &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployerError::ContractAlreadyDeployed { .. }));
        assert!(compiler.compiled().is_empty());
    }

    #[tokio::test]
    async fn unresolved_constructor_arg_stops_before_compiling() {
        let mut client = MockChainClient::new();
        client.expect_estimate_gas().never();
        client.expect_send_raw_transaction().never();
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new().with_contract("Vault", VAULT_ABI);
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&client, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        let err = executor
            .deploy(
                1,
                &deploy_step("Vault", vec![json!("{{Token.address}}"), json!("main")]),
                &plan(),
                &mut ctx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DeployerError::UnresolvedReference { .. }));
        assert!(compiler.compiled().is_empty());
        assert!(!ctx.contains("Vault"));
    }

    #[tokio::test]
    async fn call_against_unknown_contract_sends_nothing() {
        let mut client = MockChainClient::new();
        client.expect_get_transaction_count().never();
        client.expect_estimate_gas().never();
        client.expect_send_raw_transaction().never();
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new();
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&client, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        let err = executor
            .call(2, &call_step("Vault", "setToken", vec![]), &plan(), &ctx)
            .await
            .unwrap_err();

        match err {
            DeployerError::UnknownContract { name } => assert_eq!(name, "Vault"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn call_targets_recorded_address_and_adds_no_entry() {
        let chain = StubChain::new(3);
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new();
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&chain, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);
        ctx.record(
            "Vault",
            ContextEntry {
                address: Address::repeat_byte(0x55),
                abi: Some(serde_json::from_str(VAULT_ABI).unwrap()),
            },
        )
        .unwrap();

        let outcome = executor
            .call(
                2,
                &call_step("Vault", "setToken", vec![json!("{{deployer.address}}")]),
                &plan(),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.nonce, 3);
        assert_eq!(outcome.contract_address, None);
        assert_eq!(ctx.len(), 2);
        assert_eq!(chain.estimate_calls(), 1);
    }

    #[tokio::test]
    async fn gas_limit_override_skips_estimation() {
        let chain = StubChain::new(0);
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new().with_contract("Token", TOKEN_ABI);
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&chain, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let mut ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        let mut step = deploy_step("Token", vec![]);
        step.gas_limit_override = Some(2_000_000);
        executor.deploy(1, &step, &plan(), &mut ctx).await.unwrap();

        assert_eq!(chain.estimate_calls(), 0);
    }

    #[tokio::test]
    async fn call_on_deployer_account_fails() {
        let chain = StubChain::new(0);
        let signer = RecordingSigner::new();
        let compiler = StubCompiler::new();
        let (gas, retry) = policies();
        let executor = StepExecutor::new(&chain, &signer, &compiler, &gas, &retry, CHAIN_ID);
        let ctx = DeploymentContext::seeded("deployer", RecordingSigner::ADDRESS);

        let err = executor
            .call(1, &call_step("deployer", "anything", vec![]), &plan(), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployerError::AbiEncoding(_)));
        assert!(chain.submitted_nonces().is_empty());
    }

    #[test]
    fn overloads_selected_by_arity() {
        let abi: Abi = serde_json::from_str(
            r#"[
                {"type": "function", "name": "set", "stateMutability": "nonpayable",
                 "inputs": [{"name": "a", "type": "uint256"}], "outputs": []},
                {"type": "function", "name": "set", "stateMutability": "nonpayable",
                 "inputs": [{"name": "a", "type": "uint256"}, {"name": "b", "type": "bool"}], "outputs": []}
            ]"#,
        )
        .unwrap();

        let f = select_function(&abi, "set", &[json!(1), json!(true)]).unwrap();
        assert_eq!(f.inputs.len(), 2);
        assert!(select_function(&abi, "set", &[]).is_err());
        assert!(select_function(&abi, "missing", &[]).is_err());
    }

    #[test]
    fn constructorless_contract_rejects_args() {
        let abi: Abi = serde_json::from_str(TOKEN_ABI).unwrap();
        let bytecode = Bytes::from(vec![0x60]);

        assert_eq!(encode_deployment(&abi, &bytecode, &[]).unwrap(), bytecode);
        assert!(encode_deployment(&abi, &bytecode, &[json!(1)]).is_err());
    }
}
