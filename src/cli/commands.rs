use crate::cli::config::HarnessConfig;
use crate::context::{ContextInputs, GelatoArgs, StorageMap, StorageState, UserArgs};
use crate::functions::builtin_catalog;
use crate::rpc::{probe_chain_id, JsonRpcEndpoint, RpcEndpoint};
use crate::runtime::builder::{load_secrets, FunctionBuilder, SchemaBuilder};
use crate::runtime::executor::executor_for;
use crate::runtime::runner::FunctionRunner;
use crate::store;
use crate::utils::serde_helpers::parse_quantity;
use crate::utils::METRICS;
use alloy_primitives::U256;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Per-run options of `w3f run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub name: String,
    /// JSON object of user args.
    pub user_args: Option<String>,
    /// JSON object replacing the stored snapshot.
    pub storage: Option<String>,
    pub chain_id: Option<u64>,
    pub persist: bool,
}

/// Build and run one function, print its outcome, persist its storage on success.
pub async fn run_function(config: &HarnessConfig, opts: RunOptions) -> Result<ExitCode> {
    let catalog = Arc::new(builtin_catalog());
    let built = SchemaBuilder::new(catalog.clone()).build(&config.functions_dir.join(&opts.name))?;
    let secrets = load_secrets(&built.path)?;

    let snapshot_store = store::open(config.storage_dir.as_deref())?;
    let snapshot: StorageMap = match &opts.storage {
        Some(raw) => serde_json::from_str(raw).context("--storage must be a JSON object of strings")?,
        None => snapshot_store.load(&built.name).await?,
    };
    let user_args: UserArgs = match &opts.user_args {
        Some(raw) => serde_json::from_str(raw).context("--user-args must be a JSON object")?,
        None => UserArgs::new(),
    };

    let endpoints = config
        .provider_urls
        .iter()
        .map(|url| JsonRpcEndpoint::new(url).map(|e| Arc::new(e) as Arc<dyn RpcEndpoint>))
        .collect::<crate::utils::Result<Vec<_>>>()?;
    let gelato_args = gelato_args(endpoints.first(), opts.chain_id).await?;

    let mut inputs = ContextInputs::new(gelato_args)
        .with_secrets(secrets)
        .with_storage(snapshot)
        .with_user_args(user_args);
    for endpoint in endpoints {
        inputs = inputs.with_endpoint(endpoint);
    }

    let worker = std::env::current_exe().context("locate worker executable")?;
    let runner = FunctionRunner::new(executor_for(config.runtime, catalog, worker)).with_limits(config.limits.clone());
    let outcome = runner.run(&built, inputs).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    let (counters, gauges) = METRICS.snapshot();
    debug!(?counters, ?gauges, "metrics");

    if outcome.success() && outcome.storage.state == StorageState::Updated {
        if opts.persist {
            snapshot_store.persist(&built.name, &outcome.storage.storage).await?;
            info!(store = %snapshot_store.name(), path = ?snapshot_store.path(), "storage persisted");
        } else {
            warn!("storage updated but not persisted");
        }
    }
    Ok(if outcome.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Chain metadata from the default provider; current time and zero gas price without one.
async fn gelato_args(endpoint: Option<&Arc<dyn RpcEndpoint>>, chain_id: Option<u64>) -> Result<GelatoArgs> {
    let Some(endpoint) = endpoint else {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        return Ok(GelatoArgs::new(chain_id.unwrap_or(1), now, U256::ZERO));
    };
    let chain_id = match chain_id {
        Some(id) => id,
        None => probe_chain_id(endpoint.as_ref()).await?,
    };
    let gas_price = quantity_u256(&endpoint.request("eth_gasPrice", vec![]).await?)?;
    let block = endpoint
        .request("eth_getBlockByNumber", vec![Value::from("latest"), Value::Bool(false)])
        .await?;
    let block_time = block["timestamp"]
        .as_str()
        .ok_or_else(|| anyhow!("latest block has no timestamp"))
        .and_then(|raw| parse_quantity(raw).map_err(|e| anyhow!(e)))?;
    Ok(GelatoArgs::new(chain_id, block_time, gas_price))
}

fn quantity_u256(value: &Value) -> Result<U256> {
    let raw = value.as_str().ok_or_else(|| anyhow!("expected a hex quantity, got {value}"))?;
    Ok(U256::from_str_radix(raw.trim_start_matches("0x"), 16)?)
}

/// Compiled functions and whether their manifest builds.
pub fn list_functions(config: &HarnessConfig) -> Result<ExitCode> {
    let catalog = Arc::new(builtin_catalog());
    let builder = SchemaBuilder::new(catalog.clone());
    for name in catalog.names() {
        match builder.build(&config.functions_dir.join(&name)) {
            Ok(built) => println!("{name}\tmemory={}MB timeout={}s digest={}", built.schema.memory, built.schema.timeout, built.digest),
            Err(err) => println!("{name}\tunavailable: {err}"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hex_gas_price() {
        assert_eq!(quantity_u256(&json!("0x3b9aca00")).unwrap(), U256::from(1_000_000_000u64));
        assert!(quantity_u256(&json!(5)).is_err());
    }

    #[tokio::test]
    async fn gelato_args_without_provider() {
        let args = gelato_args(None, Some(137)).await.unwrap();
        assert_eq!(args.chain_id, 137);
        assert_eq!(args.gas_price, U256::ZERO);
        assert!(args.block_time > 0);
    }
}
