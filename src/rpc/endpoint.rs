use crate::utils::{HarnessError, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout for RPC endpoints.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A raw blockchain node reachable over JSON-RPC.
///
/// Implement this trait for anything that can answer RPC calls (HTTP node, fork, mock)
/// and hand it to the context builder. Function bodies never see it directly.
#[async_trait]
pub trait RpcEndpoint: Send + Sync + 'static {
    /// Human-readable location, for logs.
    fn url(&self) -> String;

    /// Issue one call. `params` is the positional parameter array.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

/// Liveness probe: ask the endpoint which chain it serves.
pub async fn probe_chain_id(endpoint: &dyn RpcEndpoint) -> Result<u64> {
    let value = endpoint.request("eth_chainId", vec![]).await?;
    let raw = value
        .as_str()
        .ok_or_else(|| HarnessError::Rpc(format!("eth_chainId returned {value}")))?;
    let chain_id = crate::utils::serde_helpers::parse_quantity(raw).map_err(HarnessError::Rpc)?;
    debug!(url = %endpoint.url(), chain_id, "provider probed");
    Ok(chain_id)
}

/// JSON-RPC over HTTP, backed by the jsonrpsee client.
pub struct JsonRpcEndpoint {
    url: String,
    client: HttpClient,
}

impl JsonRpcEndpoint {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, RPC_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| HarnessError::Config(format!("invalid provider url {url}: {e}")))?;
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl RpcEndpoint for JsonRpcEndpoint {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut array = ArrayParams::new();
        for p in params {
            array.insert(p).map_err(|e| HarnessError::Rpc(e.to_string()))?;
        }
        self.client
            .request::<Value, _>(method, array)
            .await
            .map_err(|e| HarnessError::Rpc(format!("{method}: {e}")))
    }
}
