//! Multi-chain provider: read-only RPC handles, one per configured chain.
//!
//! The function body only ever sees [`Provider`] handles. Every call is routed through a
//! [`ChainAccess`] implementation, which on the host charges the run's limiter before
//! the request reaches the endpoint.

use crate::rpc::types::{Block, BlockTag, CallRequest, Log, LogFilter};
use crate::rpc::RpcEndpoint;
use crate::runtime::limiter::ResourceLimiter;
use crate::utils::serde_helpers::parse_quantity;
use crate::utils::{HarnessError, Result};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Chain capability handed to function bodies.
#[async_trait]
pub trait ChainAccess: Send + Sync + 'static {
    async fn request(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Report a fatal provider fault (unknown chain, no provider) so the run fails
    /// even if the function body swallows the error.
    fn fail(&self, err: HarnessError) -> HarnessError;
}

/// Host-side chain access over probed endpoints.
pub struct HostChains {
    endpoints: Vec<(u64, Arc<dyn RpcEndpoint>)>,
    limiter: Arc<ResourceLimiter>,
}

impl HostChains {
    pub fn new(endpoints: Vec<(u64, Arc<dyn RpcEndpoint>)>, limiter: Arc<ResourceLimiter>) -> Self {
        Self { endpoints, limiter }
    }

    /// Configured chain ids, in configuration order.
    pub fn chain_ids(&self) -> Vec<u64> {
        self.endpoints.iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl ChainAccess for HostChains {
    async fn request(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value> {
        let endpoint = self
            .endpoints
            .iter()
            .find(|(id, _)| *id == chain_id)
            .map(|(_, e)| e.clone())
            .ok_or_else(|| self.limiter.trip(HarnessError::UnknownChain(chain_id)))?;

        let upload = method.len() + Value::Array(params.clone()).to_string().len();
        self.limiter.begin_rpc(upload as u64)?;
        debug!(chain_id, method, "rpc call");
        let value = endpoint.request(method, params).await?;
        self.limiter.record_download(value.to_string().len() as u64)?;
        Ok(value)
    }

    fn fail(&self, err: HarnessError) -> HarnessError {
        self.limiter.trip(err)
    }
}

/// Entry point to every configured chain.
#[derive(Clone)]
pub struct MultiChainProvider {
    chains: Vec<u64>,
    access: Arc<dyn ChainAccess>,
}

impl MultiChainProvider {
    pub fn new(chains: Vec<u64>, access: Arc<dyn ChainAccess>) -> Self {
        Self { chains, access }
    }

    /// The first configured chain.
    pub fn default(&self) -> Result<Provider> {
        match self.chains.first() {
            Some(id) => Ok(self.handle(*id)),
            None => Err(self.access.fail(HarnessError::NoProviderConfigured)),
        }
    }

    pub fn chain(&self, chain_id: u64) -> Result<Provider> {
        if !self.chains.contains(&chain_id) {
            return Err(self.access.fail(HarnessError::UnknownChain(chain_id)));
        }
        Ok(self.handle(chain_id))
    }

    pub fn chain_ids(&self) -> &[u64] {
        &self.chains
    }

    fn handle(&self, chain_id: u64) -> Provider {
        Provider { chain_id, access: self.access.clone() }
    }
}

/// Read-only RPC handle bound to one chain. Never signs.
#[derive(Clone)]
pub struct Provider {
    chain_id: u64,
    access: Arc<dyn ChainAccess>,
}

impl Provider {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Raw JSON-RPC call.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.access.request(self.chain_id, method, params).await
    }

    async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| HarnessError::Rpc(format!("{method}: malformed response: {e}")))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.request_as("eth_blockNumber", vec![]).await?;
        parse_quantity(&raw).map_err(HarnessError::Rpc)
    }

    pub async fn block(&self, tag: BlockTag) -> Result<Block> {
        let block: Option<Block> =
            self.request_as("eth_getBlockByNumber", vec![tag.to_value(), Value::Bool(false)]).await?;
        block.ok_or_else(|| HarnessError::Rpc(format!("block {tag:?} not found")))
    }

    pub async fn latest_block(&self) -> Result<Block> {
        self.block(BlockTag::Latest).await
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = serde_json::to_value(CallRequest { to, data })
            .map_err(|e| HarnessError::Rpc(e.to_string()))?;
        self.request_as("eth_call", vec![request, BlockTag::Latest.to_value()]).await
    }

    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let filter = serde_json::to_value(filter).map_err(|e| HarnessError::Rpc(e.to_string()))?;
        self.request_as("eth_getLogs", vec![filter]).await
    }

    pub async fn gas_price(&self) -> Result<U256> {
        let raw: String = self.request_as("eth_gasPrice", vec![]).await?;
        U256::from_str_radix(raw.trim_start_matches("0x"), 16)
            .map_err(|e| HarnessError::Rpc(format!("eth_gasPrice: {e}")))
    }
}
