//! Error types for the formula deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network '{id}' not found in registry")]
    NetworkNotFound { id: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Formula file not found: {path}")]
    FormulaNotFound { path: String },

    #[error("Invalid formula: {0}")]
    InvalidFormula(String),

    #[error("Unresolved reference: no address recorded for '{symbol}'")]
    UnresolvedReference { symbol: String },

    #[error("Unknown contract '{name}': not deployed by an earlier step")]
    UnknownContract { name: String },

    #[error("Contract '{name}' is already recorded in this run")]
    ContractAlreadyDeployed { name: String },

    #[error("ABI encoding error: {0}")]
    AbiEncoding(String),

    #[error("Compilation failed: {0}")]
    Compilation(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Step {step} failed after {attempts} attempts")]
    RetriesExhausted { step: u32, attempts: u32 },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Chain connection error: {0}")]
    ChainConnection(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure tiers, decided once where an error is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad setup; nothing touched the network yet
    Configuration,
    /// Step inputs cannot be resolved; no transaction built
    Resolution,
    /// Sequence-number race, recoverable within a step
    Transient,
    /// Everything else
    Fatal,
}

impl DeployerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployerError::Config(_)
            | DeployerError::NetworkNotFound { .. }
            | DeployerError::Wallet(_)
            | DeployerError::FormulaNotFound { .. }
            | DeployerError::InvalidFormula(_) => ErrorKind::Configuration,

            DeployerError::UnresolvedReference { .. }
            | DeployerError::UnknownContract { .. }
            | DeployerError::ContractAlreadyDeployed { .. }
            | DeployerError::AbiEncoding(_) => ErrorKind::Resolution,

            DeployerError::NonceConflict(_) => ErrorKind::Transient,

            DeployerError::Compilation(_)
            | DeployerError::RetriesExhausted { .. }
            | DeployerError::Transaction(_)
            | DeployerError::ChainConnection(_)
            | DeployerError::GasEstimation(_)
            | DeployerError::Timeout { .. }
            | DeployerError::Reverted { .. }
            | DeployerError::Io(_)
            | DeployerError::Json(_) => ErrorKind::Fatal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 3,
            ErrorKind::Resolution => 4,
            ErrorKind::Transient | ErrorKind::Fatal => 5,
        }
    }
}

/// Result type for deployer operations
pub type DeployerResult<T> = Result<T, DeployerError>;
