//! Shared fixtures for integration tests.
#![allow(dead_code)]

use alloy_primitives::U256;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use w3f_harness::context::GelatoArgs;
use w3f_harness::runtime::{BuiltFunction, FunctionBuilder, FunctionCatalog, SchemaBuilder};
use w3f_harness::test_utils::MockChain;

pub const CHAIN_ID: u64 = 31337;
/// Block timestamp used as "now" in scenarios.
pub const NOW: u64 = 1_700_000_000;

/// Manifest directory of a built-in function.
pub fn builtin_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("web3-functions").join(name)
}

pub fn build(catalog: Arc<FunctionCatalog>, dir: &Path) -> BuiltFunction {
    tokio_test::assert_ok!(SchemaBuilder::new(catalog).build(dir))
}

/// Write `<root>/<name>/schema.json` with the given user args declaration.
pub fn function_dir(root: &Path, name: &str, user_args: Value) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let schema = json!({
        "web3FunctionVersion": "2.0.0",
        "runtime": "rust-1.0",
        "memory": 128,
        "timeout": 30,
        "userArgs": user_args,
    });
    std::fs::write(dir.join("schema.json"), schema.to_string()).unwrap();
    dir
}

pub fn gelato(block_time: u64) -> GelatoArgs {
    GelatoArgs::new(CHAIN_ID, block_time, U256::from(1_000_000_000u64))
}

pub fn chain_at(number: u64, timestamp: u64) -> Arc<MockChain> {
    let chain = MockChain::new(CHAIN_ID);
    chain.set_block(number, timestamp);
    chain.set_gas_price(U256::from(1_000_000_000u64));
    Arc::new(chain)
}
