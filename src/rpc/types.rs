//! Subset of Ethereum JSON-RPC shapes used by function bodies.

use crate::utils::serde_helpers::quantity;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Block selector for `eth_getBlockByNumber` / `eth_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    pub fn to_value(self) -> Value {
        match self {
            BlockTag::Latest => Value::from("latest"),
            BlockTag::Number(n) => Value::from(format!("{n:#x}")),
        }
    }
}

/// Block header fields read by function bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: u64,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(default)]
    pub hash: Option<B256>,
}

/// `eth_getLogs` filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(with = "quantity")]
    pub from_block: u64,
    #[serde(with = "quantity")]
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

/// Read-only call request for `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}
