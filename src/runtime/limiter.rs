//! Resource limiter: per-run ceilings on outbound traffic, storage size and wall-clock time.
//!
//! Every context accessor goes through one [`ResourceLimiter`]. Counters that are known
//! before an operation is issued (requests, RPC calls, upload bytes, storage size) are
//! checked and charged up front, so a rejected operation never reaches the network.
//! Download size is charged when the response arrives.
//!
//! The first fatal fault of a run is latched; the runner reports it even when the
//! function body swallowed the accessor error and returned normally.

use crate::runtime::builder::FunctionSchema;
use crate::utils::{HarnessError, LimitKind, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

pub const MAX_REQUEST_LIMIT: u64 = 100;
pub const MAX_RPC_LIMIT: u64 = 100;
pub const MAX_DOWNLOAD_LIMIT: u64 = 10 * 1024 * 1024;
pub const MAX_UPLOAD_LIMIT: u64 = 5 * 1024 * 1024;
pub const MAX_STORAGE_LIMIT: u64 = 1024 * 1024;

/// Ceilings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLimits {
    pub timeout: Duration,
    /// Memory ceiling in MB declared by the manifest. Advisory: passed to the executor.
    pub memory_mb: u32,
    pub request_limit: u64,
    pub rpc_limit: u64,
    pub download_limit: u64,
    pub upload_limit: u64,
    pub storage_limit: u64,
}

/// Caller-supplied overrides for the default ceilings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LimitOverrides {
    pub timeout_ms: Option<u64>,
    pub request_limit: Option<u64>,
    pub rpc_limit: Option<u64>,
    pub download_limit: Option<u64>,
    pub upload_limit: Option<u64>,
    pub storage_limit: Option<u64>,
}

impl RunLimits {
    /// Limits from the manifest (timeout in seconds, memory) plus defaults and overrides.
    pub fn from_schema(schema: &FunctionSchema, overrides: &LimitOverrides) -> Self {
        let timeout = overrides
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(schema.timeout * 1000));
        Self {
            timeout,
            memory_mb: schema.memory,
            request_limit: overrides.request_limit.unwrap_or(MAX_REQUEST_LIMIT),
            rpc_limit: overrides.rpc_limit.unwrap_or(MAX_RPC_LIMIT),
            download_limit: overrides.download_limit.unwrap_or(MAX_DOWNLOAD_LIMIT),
            upload_limit: overrides.upload_limit.unwrap_or(MAX_UPLOAD_LIMIT),
            storage_limit: overrides.storage_limit.unwrap_or(MAX_STORAGE_LIMIT),
        }
    }
}

/// Counters accumulated during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub requests: u64,
    pub rpc_calls: u64,
    pub download: u64,
    pub upload: u64,
}

#[derive(Debug, Default)]
struct LimiterState {
    usage: Usage,
    fault: Option<HarnessError>,
}

/// Shared limiter for one run. All counter updates happen under one lock.
#[derive(Debug)]
pub struct ResourceLimiter {
    limits: RunLimits,
    started: Instant,
    state: Mutex<LimiterState>,
}

impl ResourceLimiter {
    pub fn new(limits: RunLimits) -> Self {
        Self { limits, started: Instant::now(), state: Mutex::new(LimiterState::default()) }
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the run deadline (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.limits.timeout.saturating_sub(self.elapsed())
    }

    /// Fail with `Timeout` once the deadline has passed.
    pub fn check_deadline(&self) -> Result<()> {
        if self.elapsed() >= self.limits.timeout {
            return Err(self.trip(self.timeout_error()));
        }
        Ok(())
    }

    pub fn timeout_error(&self) -> HarnessError {
        HarnessError::Timeout(self.limits.timeout.as_millis() as u64)
    }

    /// Charge one outbound RPC call carrying `upload` bytes.
    pub fn begin_rpc(&self, upload: u64) -> Result<()> {
        self.begin(true, upload)
    }

    /// Charge one outbound HTTP request carrying `upload` bytes.
    pub fn begin_request(&self, upload: u64) -> Result<()> {
        self.begin(false, upload)
    }

    fn begin(&self, rpc: bool, upload: u64) -> Result<()> {
        self.check_deadline()?;
        let mut state = self.state.lock();
        let usage = state.usage;
        let checks = [
            (LimitKind::Requests, usage.requests + 1, self.limits.request_limit, true),
            (LimitKind::RpcCalls, usage.rpc_calls + 1, self.limits.rpc_limit, rpc),
            (LimitKind::Upload, usage.upload + upload, self.limits.upload_limit, true),
        ];
        for (limit, used, max, applies) in checks {
            if applies && used > max {
                return Err(Self::latch(&mut state, HarnessError::LimitExceeded { limit, used, max }));
            }
        }
        state.usage.requests += 1;
        state.usage.upload += upload;
        if rpc {
            state.usage.rpc_calls += 1;
        }
        Ok(())
    }

    /// Charge `bytes` received by the function body.
    pub fn record_download(&self, bytes: u64) -> Result<()> {
        let mut state = self.state.lock();
        let used = state.usage.download + bytes;
        if used > self.limits.download_limit {
            let max = self.limits.download_limit;
            return Err(Self::latch(
                &mut state,
                HarnessError::LimitExceeded { limit: LimitKind::Download, used, max },
            ));
        }
        state.usage.download = used;
        Ok(())
    }

    /// Bytes the run may still download.
    pub fn download_remaining(&self) -> u64 {
        self.limits.download_limit.saturating_sub(self.state.lock().usage.download)
    }

    /// Accept a storage map whose projected size is `projected` bytes.
    pub fn check_storage(&self, projected: u64) -> Result<()> {
        self.check_deadline()?;
        let mut state = self.state.lock();
        if projected > self.limits.storage_limit {
            let max = self.limits.storage_limit;
            return Err(Self::latch(
                &mut state,
                HarnessError::LimitExceeded { limit: LimitKind::Storage, used: projected, max },
            ));
        }
        Ok(())
    }

    /// Record a fatal fault (first one wins) and hand it back for propagation.
    pub fn trip(&self, err: HarnessError) -> HarnessError {
        Self::latch(&mut self.state.lock(), err)
    }

    fn latch(state: &mut LimiterState, err: HarnessError) -> HarnessError {
        if state.fault.is_none() {
            warn!(error = %err, "run fault latched");
            state.fault = Some(err.clone());
        }
        err
    }

    pub fn fault(&self) -> Option<HarnessError> {
        self.state.lock().fault.clone()
    }

    pub fn usage(&self) -> Usage {
        self.state.lock().usage
    }
}
