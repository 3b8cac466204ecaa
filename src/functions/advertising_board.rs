//! Posts a random quote on an advertising board contract, at most once an hour.

use crate::context::{ExecutionContext, HttpRequest};
use crate::runtime::module::Web3Function;
use crate::runtime::outcome::{Call, ExecutionResult};
use alloy_primitives::{address, Address};
use alloy_sol_types::{sol, SolCall};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "advertising-board";

pub const DEFAULT_AD_BOARD: Address = address!("28a0A1C63E7E8F0DAe5ad633fe232c12b489d5f0");
pub const DEFAULT_QUOTE_API: &str = "https://zenquotes.io/api/random";
/// Seconds between two posts.
pub const POST_INTERVAL: u64 = 3600;
const QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

sol! {
    function postMessage(string message);
}

#[derive(Debug, Deserialize)]
struct Quote {
    q: String,
    a: String,
}

pub fn register(w3f: &mut Web3Function) {
    w3f.on_run(run);
}

async fn run(ctx: ExecutionContext) -> anyhow::Result<ExecutionResult> {
    let provider = ctx.multi_chain_provider.default()?;
    let ad_board = match ctx.user_args.get_str("adBoard") {
        Some(raw) => raw.parse::<Address>()?,
        None => DEFAULT_AD_BOARD,
    };

    let last_post = ctx
        .storage
        .get("lastPost")
        .await?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let timestamp = provider.latest_block().await?.timestamp;
    if timestamp < last_post + POST_INTERVAL {
        return Ok(ExecutionResult::skip("Time not elapsed"));
    }

    let quote_api = ctx.user_args.get_str("quoteApi").unwrap_or(DEFAULT_QUOTE_API);
    let message = match fetch_quote(&ctx, quote_api).await {
        Some(quote) => format!("{}: {}", quote.a, quote.q),
        None => return Ok(ExecutionResult::skip("QuoteApi call failed")),
    };
    info!(%message, "posting");

    ctx.storage.set("lastPost", timestamp.to_string()).await?;
    let data = postMessageCall { message }.abi_encode();
    Ok(ExecutionResult::exec_multi(vec![Call::new(ad_board, data)]))
}

async fn fetch_quote(ctx: &ExecutionContext, url: &str) -> Option<Quote> {
    let request = HttpRequest::get(url).timeout(QUOTE_TIMEOUT);
    let response = ctx.http.send(request).await.ok()?.error_for_status().ok()?;
    let quotes: Vec<Quote> = response.json().ok()?;
    quotes.into_iter().next()
}
