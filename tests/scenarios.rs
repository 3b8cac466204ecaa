//! End-to-end runs of the built-in functions, in process.

mod common;

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use common::{build, builtin_dir, chain_at, gelato, NOW};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use w3f_harness::context::{ContextInputs, StorageMap, StorageState, UserArgs};
use w3f_harness::functions::advertising_board::{self, postMessageCall, DEFAULT_AD_BOARD, POST_INTERVAL};
use w3f_harness::functions::oracle::{self, lastUpdatedCall, updatePriceCall, DEFAULT_ORACLE};
use w3f_harness::functions::{builtin_catalog, hello_world};
use w3f_harness::runtime::{ExecutionResult, FunctionRunner, InProcessExecutor};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runner() -> FunctionRunner {
    FunctionRunner::new(Arc::new(InProcessExecutor::new(Arc::new(builtin_catalog()))))
}

fn last_post(at: u64) -> StorageMap {
    StorageMap::from([("lastPost".to_string(), at.to_string())])
}

async fn quote_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"q": "Be kind", "a": "Anon"}])))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn hello_world_can_exec_without_calls() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(hello_world::NAME));
    let outcome = runner().run(&built, ContextInputs::new(gelato(NOW))).await;

    assert!(outcome.success());
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["result"], json!({"canExec": true, "callData": []}));
    assert_eq!(value["storage"]["state"], "unchanged");
}

#[tokio::test]
async fn ad_board_skips_before_interval() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let chain = chain_at(100, NOW);
    let inputs = ContextInputs::new(gelato(NOW)).with_storage(last_post(NOW)).with_endpoint(chain);

    let outcome = runner().run(&built, inputs).await;

    assert!(outcome.success());
    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("Time not elapsed")));
    assert_eq!(outcome.storage.state, StorageState::Unchanged);
    assert_eq!(outcome.storage.storage, last_post(NOW));
}

#[tokio::test]
async fn ad_board_posts_quote_after_interval() {
    let server = quote_server().await;
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let now = NOW + POST_INTERVAL;
    let inputs = ContextInputs::new(gelato(now))
        .with_storage(last_post(NOW))
        .with_user_args(UserArgs::new().with("quoteApi", format!("{}/api/random", server.uri())))
        .with_endpoint(chain_at(400, now));

    let outcome = runner().run(&built, inputs).await;

    assert!(outcome.success(), "{:?}", outcome.error());
    let Some(ExecutionResult::Exec { call_data }) = outcome.result() else {
        panic!("expected canExec, got {:?}", outcome.result());
    };
    let calls = call_data.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, DEFAULT_AD_BOARD);
    assert_eq!(&calls[0].data[..4], postMessageCall::SELECTOR.as_slice());
    let decoded = postMessageCall::abi_decode(&calls[0].data, true).unwrap();
    assert_eq!(decoded.message, "Anon: Be kind");

    assert_eq!(outcome.storage.state, StorageState::Updated);
    assert_eq!(outcome.storage.storage, last_post(now));
    assert_eq!(outcome.stats.requests, 2);
    assert_eq!(outcome.stats.rpc_calls, 1);
}

#[tokio::test]
async fn ad_board_skips_when_quote_api_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let now = NOW + POST_INTERVAL;
    let inputs = ContextInputs::new(gelato(now))
        .with_user_args(UserArgs::new().with("quoteApi", server.uri()))
        .with_endpoint(chain_at(400, now));

    let outcome = runner().run(&built, inputs).await;

    assert!(outcome.success());
    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("QuoteApi call failed")));
    assert_eq!(outcome.storage.state, StorageState::Unchanged);
}

#[tokio::test]
async fn same_snapshot_gives_same_diff() {
    let server = quote_server().await;
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let now = NOW + 2 * POST_INTERVAL;
    let inputs = ContextInputs::new(gelato(now))
        .with_storage(last_post(NOW))
        .with_user_args(UserArgs::new().with("quoteApi", format!("{}/api/random", server.uri())))
        .with_endpoint(chain_at(500, now));

    let runner = runner();
    let first = runner.run(&built, inputs.clone()).await;
    let second = runner.run(&built, inputs).await;

    assert!(first.success() && second.success());
    assert_eq!(first.storage, second.storage);
    assert_eq!(first.result(), second.result());
}

fn oracle_chain(last_updated: u64) -> Arc<w3f_harness::test_utils::MockChain> {
    let chain = chain_at(1_000, NOW);
    chain.set_call_result(
        DEFAULT_ORACLE,
        lastUpdatedCall::SELECTOR.to_vec(),
        U256::from(last_updated).to_be_bytes::<32>().to_vec(),
    );
    chain
}

#[tokio::test]
async fn oracle_skips_without_api_secret() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(oracle::NAME));
    let inputs = ContextInputs::new(gelato(NOW)).with_endpoint(oracle_chain(NOW - 600));

    let outcome = runner().run(&built, inputs).await;

    assert!(outcome.success());
    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("COINGECKO_API not set in secrets")));
}

#[tokio::test]
async fn oracle_skips_when_recently_updated() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(oracle::NAME));
    let inputs = ContextInputs::new(gelato(NOW)).with_endpoint(oracle_chain(NOW - 60));

    let outcome = runner().run(&built, inputs).await;

    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("Time not elapsed")));
}

#[tokio::test]
async fn oracle_skips_when_call_reverts() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(oracle::NAME));
    let inputs = ContextInputs::new(gelato(NOW)).with_endpoint(chain_at(1_000, NOW));

    let outcome = runner().run(&built, inputs).await;

    assert!(outcome.success());
    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("Rpc call failed")));
}

#[tokio::test]
async fn oracle_updates_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ethereum": {"usd": 1850.72}})))
        .mount(&server)
        .await;
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(oracle::NAME));
    let secrets = HashMap::from([(oracle::API_SECRET.to_string(), server.uri())]);
    let inputs = ContextInputs::new(gelato(NOW)).with_secrets(secrets).with_endpoint(oracle_chain(NOW - 600));

    let outcome = runner().run(&built, inputs).await;

    let Some(ExecutionResult::Exec { call_data }) = outcome.result() else {
        panic!("expected canExec, got {:?}", outcome.error());
    };
    let call = &call_data.calls()[0];
    assert_eq!(call.to, DEFAULT_ORACLE);
    let decoded = updatePriceCall::abi_decode(&call.data, true).unwrap();
    assert_eq!(decoded.price, U256::from(1850));
}
