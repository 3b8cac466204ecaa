//! Runtime module: builds and runs Web3 Functions.
//!
//! Exposes:
//! - FunctionBuilder / SchemaBuilder: manifest validation and module lookup.
//! - FunctionCatalog / Web3Function: compiled modules and their `onRun` entry point.
//! - ResourceLimiter: per-run ceilings policed on every context accessor.
//! - Executor: in-process or isolated worker execution.
//! - FunctionRunner: one run, normalized into a RunOutcome.

pub mod builder;
pub mod executor;
pub mod limiter;
pub mod module;
pub mod outcome;
pub mod process;
pub mod protocol;
pub mod runner;
pub mod worker;

pub use builder::{load_secrets, BuiltFunction, FunctionBuilder, FunctionSchema, SchemaBuilder};
pub use executor::{executor_for, Executor, InProcessExecutor, RuntimeMode};
pub use limiter::{LimitOverrides, ResourceLimiter, RunLimits, Usage};
pub use module::{FunctionCatalog, OnRun, Web3Function};
pub use outcome::{Call, CallData, ExecutionResult, RunOutcome, RunStats};
pub use process::ProcessExecutor;
pub use runner::FunctionRunner;
pub use worker::run_worker;
