use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Resource ceilings tracked by the limiter for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    /// Outbound requests (RPC and HTTP together).
    Requests,
    /// RPC calls issued through the multi-chain provider.
    RpcCalls,
    /// Bytes received by the function body.
    Download,
    /// Bytes sent by the function body.
    Upload,
    /// Size of the persisted storage map.
    Storage,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::Requests => "requestLimit",
            LimitKind::RpcCalls => "rpcLimit",
            LimitKind::Download => "downloadLimit",
            LimitKind::Upload => "uploadLimit",
            LimitKind::Storage => "storageLimit",
        };
        f.write_str(name)
    }
}

/// Unified error type for the harness.
///
/// Serializable so that accessor failures raised on the host can be replayed
/// inside an isolated worker unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarnessError {
    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("No onRun entry point registered")]
    NoEntryPointRegistered,

    #[error("Multiple onRun entry points registered ({0})")]
    MultipleEntryPoints(usize),

    #[error("Invalid user args: {0}")]
    InvalidUserArgs(String),

    #[error("Unknown chain: no provider configured for chain id {0}")]
    UnknownChain(u64),

    #[error("No provider configured")]
    NoProviderConfigured,

    #[error("Limit exceeded: {limit} (used {used}, max {max})")]
    LimitExceeded { limit: LimitKind, used: u64, max: u64 },

    #[error("Timeout: run exceeded {0}ms")]
    Timeout(u64),

    #[error("Function failed: {0}")]
    FunctionFailed(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl HarnessError {
    /// Short name reported in the `error.name` field of a run outcome.
    pub fn name(&self) -> &'static str {
        match self {
            HarnessError::BuildFailed(_) => "BuildFailed",
            HarnessError::NoEntryPointRegistered => "NoEntryPointRegistered",
            HarnessError::MultipleEntryPoints(_) => "MultipleEntryPoints",
            HarnessError::InvalidUserArgs(_) => "InvalidUserArgs",
            HarnessError::UnknownChain(_) => "UnknownChain",
            HarnessError::NoProviderConfigured => "NoProviderConfigured",
            HarnessError::LimitExceeded { .. } => "LimitExceeded",
            HarnessError::Timeout(_) => "Timeout",
            HarnessError::FunctionFailed(_) => "FunctionFailed",
            HarnessError::Rpc(_) => "RpcError",
            HarnessError::Http(_) => "HttpError",
            HarnessError::Worker(_) => "WorkerError",
            HarnessError::Io(_) => "IoError",
            HarnessError::Config(_) => "ConfigError",
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(e: std::io::Error) -> Self {
        HarnessError::Io(e.to_string())
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, HarnessError>;
