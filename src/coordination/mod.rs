//! Coordination of formula execution
//!
//! The coordination layer:
//! 1. Keeps the run-scoped context of deployed contracts
//! 2. Resolves `{{name.address}}` references against it
//! 3. Executes each step through the transaction layer
//! 4. Runs the steps of a formula in order, halting on the first failure

pub mod context;
pub mod encode;
pub mod engine;
pub mod executor;
pub mod resolver;

pub use engine::Runner;
