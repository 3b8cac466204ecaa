//! Executors: run a built function's handler against a host context.
//!
//! Two implementations share one contract:
//! - [`InProcessExecutor`]: the handler runs as a tokio task in this process.
//! - [`ProcessExecutor`](crate::runtime::process::ProcessExecutor): the handler runs in
//!   a `w3f worker` subprocess and reaches the context through framed calls.
//!
//! Both enforce the run deadline themselves and trip the limiter on expiry.

use crate::context::HostContext;
use crate::runtime::builder::BuiltFunction;
use crate::runtime::module::FunctionCatalog;
use crate::runtime::outcome::ExecutionResult;
use crate::runtime::process::ProcessExecutor;
use crate::utils::{HarnessError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Where function bodies execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// In-process tokio task.
    #[default]
    Thread,
    /// Isolated worker subprocess.
    Process,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, function: &BuiltFunction, host: &HostContext) -> Result<ExecutionResult>;
}

/// Executor for `mode`. `worker_program` is only used in process mode.
pub fn executor_for(mode: RuntimeMode, catalog: Arc<FunctionCatalog>, worker_program: PathBuf) -> Arc<dyn Executor> {
    match mode {
        RuntimeMode::Thread => Arc::new(InProcessExecutor::new(catalog)),
        RuntimeMode::Process => Arc::new(ProcessExecutor::new(worker_program)),
    }
}

pub struct InProcessExecutor {
    catalog: Arc<FunctionCatalog>,
}

impl InProcessExecutor {
    pub fn new(catalog: Arc<FunctionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Executor for InProcessExecutor {
    async fn execute(&self, function: &BuiltFunction, host: &HostContext) -> Result<ExecutionResult> {
        let handler = self.catalog.load(&function.name)?;
        let limiter = host.limiter();
        debug!(function = %function.name, memory_mb = limiter.limits().memory_mb, "executing in process");

        let mut task = tokio::spawn(handler(host.execution_context()));
        match tokio::time::timeout(limiter.remaining(), &mut task).await {
            Ok(joined) => handler_outcome(joined),
            Err(_) => {
                // Only cooperative code stops here: a body blocking its thread keeps running.
                task.abort();
                warn!(function = %function.name, "run deadline exceeded, task aborted");
                Err(limiter.trip(limiter.timeout_error()))
            }
        }
    }
}

/// Map a joined handler task to the run result. Errors that are already
/// `HarnessError`s (a propagated RPC error, a limit fault) keep their identity.
pub(crate) fn handler_outcome(
    joined: std::result::Result<anyhow::Result<ExecutionResult>, JoinError>,
) -> Result<ExecutionResult> {
    match joined {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(match err.downcast::<HarnessError>() {
            Ok(harness) => harness,
            Err(other) => HarnessError::FunctionFailed(format!("{other:#}")),
        }),
        Err(join) if join.is_panic() => {
            let payload = join.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(HarnessError::FunctionFailed(message))
        }
        Err(join) => Err(HarnessError::FunctionFailed(format!("handler task cancelled: {join}"))),
    }
}
