//! Formula files: ordered deployment and configuration plans
//!
//! A formula is loaded once per run and never mutated. Steps are kept in
//! ascending step-number order regardless of their order in the file.

use crate::error::{DeployerError, DeployerResult};

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A loaded, validated formula
#[derive(Debug, Clone)]
pub struct Formula {
    pub name: String,
    steps: Vec<Step>,
}

/// One atomic unit of a formula
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub number: u32,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Deploy(DeployStep),
    CallFunction(CallStep),
    /// Action kind this version does not know; skipped at run time
    Unsupported {
        action: String,
        contract_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployStep {
    pub contract_name: String,
    pub source: PathBuf,
    pub constructor_args: Vec<Value>,
    pub gas_limit_override: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStep {
    pub contract_name: String,
    pub function_name: String,
    pub args: Vec<Value>,
    pub gas_limit_override: Option<u64>,
}

impl StepAction {
    pub fn kind(&self) -> &str {
        match self {
            StepAction::Deploy(_) => "deploy",
            StepAction::CallFunction(_) => "call_function",
            StepAction::Unsupported { action, .. } => action,
        }
    }

    pub fn contract_name(&self) -> &str {
        match self {
            StepAction::Deploy(d) => &d.contract_name,
            StepAction::CallFunction(c) => &c.contract_name,
            StepAction::Unsupported { contract_name, .. } => contract_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FormulaFile {
    name: String,
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepEntry {
    step: i64,
    action: String,
    contract_name: String,
    source: Option<String>,
    function: Option<String>,
    #[serde(default)]
    args: Vec<Value>,
    gas_limit: Option<u64>,
}

impl StepEntry {
    fn into_step(self) -> DeployerResult<Step> {
        let number = u32::try_from(self.step)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                DeployerError::InvalidFormula(format!(
                    "step number {} must be a positive integer",
                    self.step
                ))
            })?;

        let action = match self.action.as_str() {
            "deploy" => {
                let source = self.source.ok_or_else(|| {
                    DeployerError::InvalidFormula(format!(
                        "step {}: deploy of '{}' has no source",
                        number, self.contract_name
                    ))
                })?;
                StepAction::Deploy(DeployStep {
                    contract_name: self.contract_name,
                    source: PathBuf::from(source),
                    constructor_args: self.args,
                    gas_limit_override: self.gas_limit,
                })
            }
            "call_function" => {
                let function_name = self.function.ok_or_else(|| {
                    DeployerError::InvalidFormula(format!(
                        "step {}: call on '{}' has no function",
                        number, self.contract_name
                    ))
                })?;
                StepAction::CallFunction(CallStep {
                    contract_name: self.contract_name,
                    function_name,
                    args: self.args,
                    gas_limit_override: self.gas_limit,
                })
            }
            other => StepAction::Unsupported {
                action: other.to_string(),
                contract_name: self.contract_name,
            },
        };

        Ok(Step { number, action })
    }
}

impl Formula {
    /// Build a formula, validating step numbers and sorting into execution order
    pub fn new(name: impl Into<String>, mut steps: Vec<Step>) -> DeployerResult<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if step.number == 0 {
                return Err(DeployerError::InvalidFormula(
                    "step numbers must be positive".to_string(),
                ));
            }
            if !seen.insert(step.number) {
                return Err(DeployerError::InvalidFormula(format!(
                    "duplicate step number {}",
                    step.number
                )));
            }
        }

        steps.sort_by_key(|s| s.number);

        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    /// Parse a formula from its JSON text
    pub fn parse(content: &str) -> DeployerResult<Self> {
        let file: FormulaFile = serde_json::from_str(content)
            .map_err(|e| DeployerError::InvalidFormula(e.to_string()))?;

        let steps = file
            .steps
            .into_iter()
            .map(StepEntry::into_step)
            .collect::<DeployerResult<Vec<_>>>()?;

        Self::new(file.name, steps)
    }

    /// Load a formula from disk
    pub fn load(path: &Path) -> DeployerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DeployerError::FormulaNotFound {
                path: path.display().to_string(),
            },
            _ => DeployerError::Config(format!(
                "Failed to read formula {}: {}",
                path.display(),
                e
            )),
        })?;

        Self::parse(&content)
    }

    /// Steps in ascending step-number order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Resolve a formula argument to a file path.
///
/// Bare names are looked up in the formulas directory; anything that already
/// exists on disk is used as given.
pub fn formula_path(formulas_dir: &Path, name: &str) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        direct
    } else {
        formulas_dir.join(name)
    }
}
