//! Counts `PriceUpdated` events emitted by an oracle and reports new ones to a counter
//! contract.
//!
//! Progress is kept in storage (`lastBlockNumber`, `totalEvents`), so each run only
//! scans blocks it has not seen yet, in windows of [`MAX_RANGE`] blocks and at most
//! [`MAX_REQUESTS`] `eth_getLogs` calls per run.

use crate::context::ExecutionContext;
use crate::rpc::types::LogFilter;
use crate::runtime::module::Web3Function;
use crate::runtime::outcome::{Call, ExecutionResult};
use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use tracing::{debug, info};

pub const NAME: &str = "event-listener";

pub const DEFAULT_ORACLE: Address = address!("71B9B0F6C999CBbB0FeF9c92B80D54e4973214da");
pub const DEFAULT_COUNTER: Address = address!("8F143A5D62de01EAdAF9ef16d4d3694380066D9F");
pub const MAX_RANGE: u64 = 100;
pub const MAX_REQUESTS: u64 = 100;
/// Blocks scanned back from the head on a first run.
pub const INITIAL_LOOKBACK: u64 = 2000;

sol! {
    event PriceUpdated(uint256 indexed time, uint256 price);
    function increaseCount(uint256 amount);
}

pub fn register(w3f: &mut Web3Function) {
    w3f.on_run(run);
}

fn address_arg(ctx: &ExecutionContext, key: &str, default: Address) -> anyhow::Result<Address> {
    Ok(match ctx.user_args.get_str(key) {
        Some(raw) => raw.parse()?,
        None => default,
    })
}

async fn run(ctx: ExecutionContext) -> anyhow::Result<ExecutionResult> {
    let provider = ctx.multi_chain_provider.default()?;
    let oracle = address_arg(&ctx, "oracle", DEFAULT_ORACLE)?;
    let counter = address_arg(&ctx, "counter", DEFAULT_COUNTER)?;

    let current_block = match provider.block_number().await {
        Ok(n) => n,
        Err(err) => return Ok(ExecutionResult::skip(format!("Rpc call failed: {err}"))),
    };
    let mut last_block = match ctx.storage.get("lastBlockNumber").await? {
        Some(raw) => raw.parse::<u64>()?,
        None => current_block.saturating_sub(INITIAL_LOOKBACK),
    };
    let mut total_events = match ctx.storage.get("totalEvents").await? {
        Some(raw) => raw.parse::<u64>()?,
        None => 0,
    };

    let mut logs = Vec::new();
    let mut requests = 0;
    while last_block < current_block && requests < MAX_REQUESTS {
        requests += 1;
        let from_block = last_block + 1;
        let to_block = (from_block + MAX_RANGE).min(current_block);
        let filter = LogFilter { address: oracle, topics: vec![PriceUpdated::SIGNATURE_HASH], from_block, to_block };
        match provider.logs(&filter).await {
            Ok(batch) => logs.extend(batch),
            Err(err) => return Ok(ExecutionResult::skip(format!("Rpc call failed: {err}"))),
        }
        last_block = to_block;
    }

    info!(matched = logs.len(), "new events");
    for log in &logs {
        match PriceUpdated::decode_raw_log(log.topics.iter().copied(), &log.data, true) {
            Ok(event) => info!(price = %event.price, time = %event.time, "price updated"),
            Err(err) => debug!(error = %err, "skipping undecodable log"),
        }
    }
    let new_events = logs.len() as u64;
    total_events += new_events;

    ctx.storage.set("lastBlockNumber", last_block.to_string()).await?;
    ctx.storage.set("totalEvents", total_events.to_string()).await?;

    if new_events == 0 {
        return Ok(ExecutionResult::skip(format!(
            "Total events matched: {total_events} (at block #{current_block})"
        )));
    }
    let data = increaseCountCall { amount: U256::from(new_events) }.abi_encode();
    Ok(ExecutionResult::exec_multi(vec![Call::new(counter, data)]))
}
