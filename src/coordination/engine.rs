//! Formula runner: executes every step in order and halts on the first failure

use super::context::DeploymentContext;
use super::executor::StepExecutor;
use crate::chain::{ChainClient, TransactionSigner};
use crate::compiler::ContractCompiler;
use crate::config::TransactionConfig;
use crate::error::DeployerResult;
use crate::formula::{Formula, Step, StepAction};
use crate::tx::{GasPlan, GasPolicy, RetryPolicy, TransactionOutcome};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
}

/// Audit record of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: u32,
    pub action: String,
    pub contract_name: String,
    pub status: StepStatus,
    pub transaction: Option<TransactionOutcome>,
}

/// Audit record of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub formula: String,
    pub network: String,
    pub deployer: Address,
    pub gas_plan: GasPlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub context: BTreeMap<String, Address>,
}

/// Executes formulas against one network with one account
pub struct Runner {
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    compiler: Arc<dyn ContractCompiler>,
    gas_policy: GasPolicy,
    retry_policy: RetryPolicy,
    chain_id: u64,
    network: String,
    deployer_name: String,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        compiler: Arc<dyn ContractCompiler>,
        config: &TransactionConfig,
        chain_id: u64,
        network: impl Into<String>,
        deployer_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            signer,
            compiler,
            gas_policy: GasPolicy::from_config(config),
            retry_policy: RetryPolicy::from_config(config),
            chain_id,
            network: network.into(),
            deployer_name: deployer_name.into(),
        }
    }

    /// Fresh context for a run, holding the deployer's own address
    pub fn new_context(&self) -> DeploymentContext {
        DeploymentContext::seeded(&self.deployer_name, self.signer.address())
    }

    /// Run `formula` from scratch
    pub async fn run(&self, formula: &Formula) -> DeployerResult<RunReport> {
        let mut context = self.new_context();
        self.run_with(formula, &mut context).await
    }

    /// Run `formula`, recording deployments into `context`
    pub async fn run_with(
        &self,
        formula: &Formula,
        context: &mut DeploymentContext,
    ) -> DeployerResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            %run_id,
            formula = %formula.name,
            network = %self.network
        );

        self.execute_formula(run_id, formula, context)
            .instrument(span)
            .await
    }

    async fn execute_formula(
        &self,
        run_id: Uuid,
        formula: &Formula,
        context: &mut DeploymentContext,
    ) -> DeployerResult<RunReport> {
        let started_at = Utc::now();
        info!(
            "Starting formula '{}' ({} steps) as {:?}",
            formula.name,
            formula.steps().len(),
            self.signer.address()
        );

        let plan = self.gas_policy.select_plan(self.client.as_ref()).await?;
        let mut steps = Vec::with_capacity(formula.steps().len());

        for step in formula.steps() {
            let span = info_span!(
                "step",
                number = step.number,
                contract = %step.action.contract_name()
            );

            match self.execute_step(step, &plan, context).instrument(span).await {
                Ok(report) => steps.push(report),
                Err(e) => {
                    error!(
                        "Formula '{}' halted at step {}: {}",
                        formula.name, step.number, e
                    );
                    log_progress(&steps, context);
                    return Err(e);
                }
            }
        }

        info!("All steps of formula '{}' completed", formula.name);

        Ok(RunReport {
            run_id,
            formula: formula.name.clone(),
            network: self.network.clone(),
            deployer: self.signer.address(),
            gas_plan: plan,
            started_at,
            finished_at: Utc::now(),
            steps,
            context: context.addresses(),
        })
    }

    async fn execute_step(
        &self,
        step: &Step,
        plan: &GasPlan,
        context: &mut DeploymentContext,
    ) -> DeployerResult<StepReport> {
        info!(
            "Step {}: '{}' for '{}'",
            step.number,
            step.action.kind(),
            step.action.contract_name()
        );

        let executor = StepExecutor::new(
            self.client.as_ref(),
            self.signer.as_ref(),
            self.compiler.as_ref(),
            &self.gas_policy,
            &self.retry_policy,
            self.chain_id,
        );

        let transaction = match &step.action {
            StepAction::Deploy(deploy) => {
                Some(executor.deploy(step.number, deploy, plan, context).await?)
            }
            StepAction::CallFunction(call) => {
                Some(executor.call(step.number, call, plan, context).await?)
            }
            StepAction::Unsupported { action, .. } => {
                warn!("Unknown action '{}' in step {}, skipping", action, step.number);
                None
            }
        };

        let status = if transaction.is_some() {
            StepStatus::Completed
        } else {
            StepStatus::Skipped
        };

        Ok(StepReport {
            step: step.number,
            action: step.action.kind().to_string(),
            contract_name: step.action.contract_name().to_string(),
            status,
            transaction,
        })
    }
}

/// Log what finished before a failure so the run can be resumed by hand
fn log_progress(steps: &[StepReport], context: &DeploymentContext) {
    for report in steps {
        match &report.transaction {
            Some(tx) => info!(
                "Completed step {} ({} '{}'): tx {:?}",
                report.step, report.action, report.contract_name, tx.tx_hash
            ),
            None => info!("Skipped step {} ({})", report.step, report.action),
        }
    }
    info!("{} names recorded before the failure", context.len());
    for (name, address) in context.addresses() {
        info!("Recorded {} at {:?}", name, address);
    }
}
