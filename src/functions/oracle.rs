//! Pushes the CoinGecko price of a currency to an oracle contract every 5 minutes.
//!
//! The API base url is read from the `COINGECKO_API` secret.

use crate::context::{ExecutionContext, HttpRequest};
use crate::runtime::module::Web3Function;
use crate::runtime::outcome::{Call, ExecutionResult};
use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "oracle";

pub const DEFAULT_ORACLE: Address = address!("71B9B0F6C999CBbB0FeF9c92B80D54e4973214da");
pub const DEFAULT_CURRENCY: &str = "ethereum";
pub const API_SECRET: &str = "COINGECKO_API";
/// Seconds between two updates.
pub const UPDATE_INTERVAL: u64 = 300;
const PRICE_TIMEOUT: Duration = Duration::from_secs(5);

sol! {
    function lastUpdated() external view returns (uint256);
    function updatePrice(uint256 price);
}

pub fn register(w3f: &mut Web3Function) {
    w3f.on_run(run);
}

async fn run(ctx: ExecutionContext) -> anyhow::Result<ExecutionResult> {
    let provider = ctx.multi_chain_provider.default()?;
    let oracle = match ctx.user_args.get_str("oracle") {
        Some(raw) => raw.parse::<Address>()?,
        None => DEFAULT_ORACLE,
    };

    let last_updated = match provider.call(oracle, lastUpdatedCall {}.abi_encode().into()).await {
        Ok(output) => match lastUpdatedCall::abi_decode_returns(&output, true) {
            Ok(ret) => u64::try_from(ret._0).unwrap_or(u64::MAX),
            Err(_) => return Ok(ExecutionResult::skip("Rpc call failed")),
        },
        Err(_) => return Ok(ExecutionResult::skip("Rpc call failed")),
    };
    info!(last_updated, "last oracle update");

    let next_update = last_updated.saturating_add(UPDATE_INTERVAL);
    let timestamp = provider.latest_block().await?.timestamp;
    info!(next_update, "next oracle update");
    if timestamp < next_update {
        return Ok(ExecutionResult::skip("Time not elapsed"));
    }

    let Some(api) = ctx.secrets.get(API_SECRET).await? else {
        return Ok(ExecutionResult::skip(format!("{API_SECRET} not set in secrets")));
    };
    let currency = ctx.user_args.get_str("currency").unwrap_or(DEFAULT_CURRENCY);
    let url = format!("{api}/simple/price?ids={currency}&vs_currencies=usd");
    let Some(price) = fetch_price(&ctx, &url, currency).await else {
        return Ok(ExecutionResult::skip("Coingecko call failed"));
    };
    info!(price, "updating price");

    let data = updatePriceCall { price: U256::from(price) }.abi_encode();
    Ok(ExecutionResult::exec_multi(vec![Call::new(oracle, data)]))
}

/// Whole-dollar price, rounded down.
async fn fetch_price(ctx: &ExecutionContext, url: &str, currency: &str) -> Option<u64> {
    let response = ctx.http.send(HttpRequest::get(url).timeout(PRICE_TIMEOUT)).await.ok()?;
    let body: Value = response.error_for_status().ok()?.json().ok()?;
    let usd = body.get(currency)?.get("usd")?.as_f64()?;
    (usd.is_finite() && usd >= 0.0).then(|| usd.floor() as u64)
}
