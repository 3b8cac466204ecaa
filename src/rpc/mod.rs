//! RPC module
//!
//! - `RpcEndpoint`: raw JSON-RPC access to one chain (jsonrpsee HTTP client, or a mock)
//! - `types`: block, log and call shapes used by function bodies
//!
//! Endpoints are wrapped by the context's multi-chain provider, which routes every
//! call through the run's resource limiter.

pub mod endpoint;
pub mod types;

pub use endpoint::{probe_chain_id, JsonRpcEndpoint, RpcEndpoint};
pub use types::{Block, BlockTag, CallRequest, Log, LogFilter};
