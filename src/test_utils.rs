//! In-memory chain for tests (feature `test-utils`).

use crate::rpc::types::{Block, Log};
use crate::rpc::RpcEndpoint;
use crate::utils::serde_helpers::parse_quantity;
use crate::utils::{HarnessError, Result};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Seconds between mock blocks.
pub const BLOCK_TIME: u64 = 12;

#[derive(Default)]
struct MockState {
    block_number: u64,
    timestamp: u64,
    gas_price: U256,
    /// (to, calldata prefix, return data)
    call_results: Vec<(Address, Bytes, Bytes)>,
    logs: Vec<Log>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

/// Scriptable JSON-RPC endpoint.
pub struct MockChain {
    chain_id: u64,
    state: Mutex<MockState>,
    calls: AtomicU64,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, state: Mutex::new(MockState::default()), calls: AtomicU64::new(0) }
    }

    pub fn set_block(&self, number: u64, timestamp: u64) {
        let mut state = self.state.lock();
        state.block_number = number;
        state.timestamp = timestamp;
    }

    pub fn set_gas_price(&self, price: U256) {
        self.state.lock().gas_price = price;
    }

    /// Answer `eth_call` to `to` whose calldata starts with `prefix`.
    pub fn set_call_result(&self, to: Address, prefix: impl Into<Bytes>, result: impl Into<Bytes>) {
        self.state.lock().call_results.push((to, prefix.into(), result.into()));
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    /// Make `method` fail with an RPC error.
    pub fn fail_method(&self, method: &str) {
        self.state.lock().failing.insert(method.to_string());
    }

    /// Delay every answer (chain id probes excluded).
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Calls served, chain id probes excluded.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn block_json(state: &MockState, number: u64) -> Value {
        if number > state.block_number {
            return Value::Null;
        }
        let timestamp = state.timestamp.saturating_sub((state.block_number - number) * BLOCK_TIME);
        json!(Block { number, timestamp, hash: None })
    }

    fn answer(&self, method: &str, params: &[Value]) -> Result<Value> {
        let state = self.state.lock();
        if state.failing.contains(method) {
            return Err(HarnessError::Rpc(format!("{method}: mock failure")));
        }
        match method {
            "eth_blockNumber" => Ok(json!(format!("{:#x}", state.block_number))),
            "eth_gasPrice" => Ok(json!(format!("0x{:x}", state.gas_price))),
            "eth_getBlockByNumber" => {
                let number = match params.first().and_then(Value::as_str) {
                    Some("latest") | None => state.block_number,
                    Some(raw) => parse_quantity(raw).map_err(HarnessError::Rpc)?,
                };
                Ok(Self::block_json(&state, number))
            }
            "eth_call" => {
                let request = params.first().cloned().unwrap_or(Value::Null);
                let to: Address = serde_json::from_value(request["to"].clone())
                    .map_err(|e| HarnessError::Rpc(format!("eth_call: bad to: {e}")))?;
                let data: Bytes = serde_json::from_value(request["data"].clone()).unwrap_or_default();
                state
                    .call_results
                    .iter()
                    .find(|(addr, prefix, _)| *addr == to && data.starts_with(prefix))
                    .map(|(_, _, result)| json!(result))
                    .ok_or_else(|| HarnessError::Rpc("execution reverted".into()))
            }
            "eth_getLogs" => {
                let filter = params.first().cloned().unwrap_or(Value::Null);
                let bound = |key: &str| -> Result<u64> {
                    match filter[key].as_str() {
                        Some(raw) => parse_quantity(raw).map_err(HarnessError::Rpc),
                        None => Ok(state.block_number),
                    }
                };
                let (from, to) = (bound("fromBlock")?, bound("toBlock")?);
                let address: Option<Address> = serde_json::from_value(filter["address"].clone()).ok();
                let topic0: Option<B256> = filter["topics"].get(0).cloned().and_then(|t| serde_json::from_value(t).ok());
                let logs: Vec<&Log> = state
                    .logs
                    .iter()
                    .filter(|log| log.block_number.is_some_and(|n| n >= from && n <= to))
                    .filter(|log| address.map_or(true, |a| log.address == a))
                    .filter(|log| topic0.map_or(true, |t| log.topics.first() == Some(&t)))
                    .collect();
                Ok(json!(logs))
            }
            other => Err(HarnessError::Rpc(format!("method {other} not supported"))),
        }
    }
}

#[async_trait]
impl RpcEndpoint for MockChain {
    fn url(&self) -> String {
        format!("mock://chain/{}", self.chain_id)
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if method == "eth_chainId" {
            return Ok(json!(format!("{:#x}", self.chain_id)));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(method, &params)
    }
}
