//! Runs through the isolated `w3f worker` subprocess.

mod common;

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use common::{build, builtin_dir, chain_at, gelato, NOW};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use w3f_harness::context::{ContextInputs, StorageMap, StorageState, UserArgs};
use w3f_harness::functions::advertising_board::{self, postMessageCall, POST_INTERVAL};
use w3f_harness::functions::oracle::{self, lastUpdatedCall, DEFAULT_ORACLE};
use w3f_harness::functions::{builtin_catalog, event_listener, hello_world};
use w3f_harness::runtime::{ExecutionResult, FunctionRunner, LimitOverrides, ProcessExecutor};
use w3f_harness::utils::{HarnessError, LimitKind};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runner(overrides: LimitOverrides) -> FunctionRunner {
    let executor = ProcessExecutor::new(PathBuf::from(env!("CARGO_BIN_EXE_w3f")));
    FunctionRunner::new(Arc::new(executor)).with_limits(overrides)
}

fn last_post(at: u64) -> StorageMap {
    StorageMap::from([("lastPost".to_string(), at.to_string())])
}

#[tokio::test]
async fn hello_world_in_worker() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(hello_world::NAME));

    let outcome = runner(LimitOverrides::default()).run(&built, ContextInputs::new(gelato(NOW))).await;

    assert!(outcome.success(), "{:?}", outcome.error());
    assert_eq!(outcome.result(), Some(&ExecutionResult::exec_multi(vec![])));
}

#[tokio::test]
async fn ad_board_in_worker_skips_before_interval() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let inputs = ContextInputs::new(gelato(NOW)).with_storage(last_post(NOW)).with_endpoint(chain_at(100, NOW));

    let outcome = runner(LimitOverrides::default()).run(&built, inputs).await;

    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("Time not elapsed")));
    assert_eq!(outcome.storage.state, StorageState::Unchanged);
}

#[tokio::test]
async fn oracle_in_worker_names_missing_secret() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(oracle::NAME));
    let chain = chain_at(1_000, NOW);
    chain.set_call_result(
        DEFAULT_ORACLE,
        lastUpdatedCall::SELECTOR.to_vec(),
        U256::from(NOW - 600).to_be_bytes::<32>().to_vec(),
    );

    let outcome = runner(LimitOverrides::default()).run(&built, ContextInputs::new(gelato(NOW)).with_endpoint(chain)).await;

    assert!(outcome.success());
    assert_eq!(outcome.result(), Some(&ExecutionResult::skip("COINGECKO_API not set in secrets")));
}

#[tokio::test]
async fn ad_board_in_worker_matches_in_process() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"q": "Be kind", "a": "Anon"}])))
        .mount(&server)
        .await;
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));
    let now = NOW + POST_INTERVAL;
    let inputs = ContextInputs::new(gelato(now))
        .with_storage(last_post(NOW))
        .with_user_args(UserArgs::new().with("quoteApi", server.uri()))
        .with_endpoint(chain_at(400, now));

    let outcome = runner(LimitOverrides::default()).run(&built, inputs).await;

    let Some(ExecutionResult::Exec { call_data }) = outcome.result() else {
        panic!("expected canExec, got {:?}", outcome.error());
    };
    let decoded = postMessageCall::abi_decode(&call_data.calls()[0].data, true).unwrap();
    assert_eq!(decoded.message, "Anon: Be kind");
    assert_eq!(outcome.storage.state, StorageState::Updated);
    assert_eq!(outcome.storage.storage, last_post(now));
    assert_eq!(outcome.stats.requests, 2);
}

#[tokio::test]
async fn worker_timeout_is_reported() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(event_listener::NAME));
    let chain = chain_at(1_000, NOW);
    chain.set_delay(Duration::from_secs(10));
    let started = Instant::now();

    let outcome = runner(LimitOverrides { timeout_ms: Some(500), ..Default::default() })
        .run(&built, ContextInputs::new(gelato(NOW)).with_endpoint(chain))
        .await;

    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(outcome.error(), Some(&HarnessError::Timeout(500)));
    assert_eq!(outcome.storage.state, StorageState::Unchanged);
}

#[tokio::test]
async fn worker_limit_fault_wins_over_skip() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(event_listener::NAME));
    let chain = chain_at(1_000, NOW);

    let outcome = runner(LimitOverrides { rpc_limit: Some(3), ..Default::default() })
        .run(&built, ContextInputs::new(gelato(NOW)).with_endpoint(chain.clone()))
        .await;

    assert_eq!(
        outcome.error(),
        Some(&HarnessError::LimitExceeded { limit: LimitKind::RpcCalls, used: 4, max: 3 })
    );
    assert_eq!(chain.calls(), 3);
}

#[tokio::test]
async fn missing_provider_fault_crosses_process_boundary() {
    let built = build(Arc::new(builtin_catalog()), &builtin_dir(advertising_board::NAME));

    let outcome = runner(LimitOverrides::default()).run(&built, ContextInputs::new(gelato(NOW))).await;

    assert_eq!(outcome.error(), Some(&HarnessError::NoProviderConfigured));
}
