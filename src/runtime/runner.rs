//! Function runner: one invocation per run, normalized into a [`RunOutcome`].

use crate::context::storage::StorageReport;
use crate::context::{ContextBuilder, ContextInputs};
use crate::runtime::builder::BuiltFunction;
use crate::runtime::executor::Executor;
use crate::runtime::limiter::{LimitOverrides, ResourceLimiter, RunLimits};
use crate::runtime::outcome::{RunOutcome, RunStats};
use crate::utils::metrics::{LAST_RUN_DURATION_MS, LIMIT_VIOLATIONS, RUNS_FAILED, RUNS_TOTAL, TIMEOUTS};
use crate::utils::{HarnessError, METRICS};
use std::sync::Arc;
use tracing::{info, warn};

/// Stateless across runs; reusable.
pub struct FunctionRunner {
    executor: Arc<dyn Executor>,
    overrides: LimitOverrides,
}

impl FunctionRunner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor, overrides: LimitOverrides::default() }
    }

    pub fn with_limits(mut self, overrides: LimitOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub async fn run(&self, function: &BuiltFunction, inputs: ContextInputs) -> RunOutcome {
        let limiter = Arc::new(ResourceLimiter::new(RunLimits::from_schema(&function.schema, &self.overrides)));
        info!(function = %function.name, timeout_ms = limiter.limits().timeout.as_millis() as u64, "run started");

        let outcome = match inputs.user_args.validate(&function.schema.user_args) {
            Err(err) => rejected(err, StorageReport::unchanged(inputs.storage), &limiter),
            Ok(()) => {
                let snapshot = inputs.storage.clone();
                // chain id lookups count against the run deadline
                let built = tokio::time::timeout(limiter.remaining(), ContextBuilder::build(inputs, limiter.clone()))
                    .await
                    .unwrap_or_else(|_| Err(limiter.trip(limiter.timeout_error())));
                match built {
                    Err(err) => rejected(err, StorageReport::unchanged(snapshot), &limiter),
                    Ok(host) => {
                        let result = match limiter.check_deadline() {
                            Ok(()) => self.executor.execute(function, &host).await,
                            Err(err) => Err(err),
                        };
                        RunOutcome::normalize(
                            result,
                            limiter.fault(),
                            host.storage_report(),
                            RunStats::new(limiter.elapsed(), limiter.usage()),
                        )
                    }
                }
            }
        };

        record_metrics(&outcome);
        match &outcome.outcome {
            Ok(result) => info!(
                function = %function.name,
                can_exec = result.can_exec(),
                duration_ms = outcome.stats.duration_ms,
                storage = ?outcome.storage.state,
                "run finished"
            ),
            Err(err) => warn!(function = %function.name, error = %err, "run failed"),
        }
        outcome
    }
}

fn rejected(err: HarnessError, storage: StorageReport, limiter: &ResourceLimiter) -> RunOutcome {
    RunOutcome::normalize(Err(err), None, storage, RunStats::new(limiter.elapsed(), limiter.usage()))
}

fn record_metrics(outcome: &RunOutcome) {
    METRICS.inc_counter(RUNS_TOTAL);
    METRICS.set_gauge(LAST_RUN_DURATION_MS, outcome.stats.duration_ms as f64);
    if let Some(err) = outcome.error() {
        METRICS.inc_counter(RUNS_FAILED);
        match err {
            HarnessError::LimitExceeded { .. } => METRICS.inc_counter(LIMIT_VIOLATIONS),
            HarnessError::Timeout(_) => METRICS.inc_counter(TIMEOUTS),
            _ => {}
        }
    }
}
