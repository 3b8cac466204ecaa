//! Execution context module
//!
//! - `args`: user args and chain metadata
//! - `secrets`, `storage`, `provider`, `http`: capability accessors, each a trait with a
//!   host (limited) implementation and a facade handed to function bodies
//!
//! [`ContextBuilder`] turns caller inputs into a [`HostContext`], which owns the limited
//! accessors for one run. In-process runs hand its [`ExecutionContext`] straight to the
//! function body; isolated runs forward worker calls to [`HostContext::serve`].

pub mod args;
pub mod http;
pub mod provider;
pub mod secrets;
pub mod storage;

pub use args::{ArgType, GelatoArgs, UserArgs};
pub use http::{Http, HttpAccess, HttpClient, HttpRequest, HttpResponse, LimitedHttp, ReqwestHttpClient};
pub use provider::{ChainAccess, HostChains, MultiChainProvider, Provider};
pub use secrets::{HostSecrets, Secrets, SecretsAccess};
pub use storage::{HostStorage, Storage, StorageAccess, StorageDiffTracker, StorageMap, StorageReport, StorageState};

use crate::rpc::{probe_chain_id, RpcEndpoint};
use crate::runtime::limiter::ResourceLimiter;
use crate::runtime::protocol::{HostCall, ReplyValue};
use crate::utils::{HarnessError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a function body receives. Built fresh per run.
#[derive(Clone)]
pub struct ExecutionContext {
    pub user_args: UserArgs,
    pub gelato_args: GelatoArgs,
    pub secrets: Secrets,
    pub storage: Storage,
    pub multi_chain_provider: MultiChainProvider,
    pub http: Http,
}

impl ExecutionContext {
    pub fn new(
        data: ContextData,
        secrets: Arc<dyn SecretsAccess>,
        storage: Arc<dyn StorageAccess>,
        chains: Arc<dyn ChainAccess>,
        http: Arc<dyn HttpAccess>,
    ) -> Self {
        Self {
            user_args: data.user_args,
            gelato_args: data.gelato_args,
            secrets: Secrets::new(secrets),
            storage: Storage::new(storage),
            multi_chain_provider: MultiChainProvider::new(data.chain_ids, chains),
            http: Http::new(http),
        }
    }
}

/// Plain-data part of the context, shipped to isolated workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    pub user_args: UserArgs,
    pub gelato_args: GelatoArgs,
    /// Probed chain ids, first one is the default chain.
    pub chain_ids: Vec<u64>,
}

/// Caller-side inputs of one run.
#[derive(Clone)]
pub struct ContextInputs {
    pub secrets: HashMap<String, String>,
    pub storage: StorageMap,
    pub user_args: UserArgs,
    pub gelato_args: GelatoArgs,
    pub endpoints: Vec<Arc<dyn RpcEndpoint>>,
    pub http_client: Arc<dyn HttpClient>,
}

impl ContextInputs {
    pub fn new(gelato_args: GelatoArgs) -> Self {
        Self {
            secrets: HashMap::new(),
            storage: StorageMap::new(),
            user_args: UserArgs::new(),
            gelato_args,
            endpoints: Vec::new(),
            http_client: Arc::new(ReqwestHttpClient::new()),
        }
    }

    pub fn with_secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_storage(mut self, storage: StorageMap) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_user_args(mut self, user_args: UserArgs) -> Self {
        self.user_args = user_args;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Arc<dyn RpcEndpoint>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = client;
        self
    }
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// Probe every endpoint and wire the limited accessors around `limiter`.
    ///
    /// Probes are not charged to the run. An endpoint whose chain id is already
    /// configured is skipped.
    pub async fn build(inputs: ContextInputs, limiter: Arc<ResourceLimiter>) -> Result<HostContext> {
        let mut endpoints: Vec<(u64, Arc<dyn RpcEndpoint>)> = Vec::new();
        for endpoint in inputs.endpoints {
            let chain_id = probe_chain_id(endpoint.as_ref())
                .await
                .map_err(|e| HarnessError::Rpc(format!("provider {} unreachable: {e}", endpoint.url())))?;
            if endpoints.iter().any(|(id, _)| *id == chain_id) {
                warn!(chain_id, url = %endpoint.url(), "duplicate provider for chain, ignored");
                continue;
            }
            endpoints.push((chain_id, endpoint));
        }

        let chains = HostChains::new(endpoints, limiter.clone());
        let data = ContextData {
            user_args: inputs.user_args,
            gelato_args: inputs.gelato_args,
            chain_ids: chains.chain_ids(),
        };
        info!(chains = ?data.chain_ids, "execution context ready");

        let tracker = Arc::new(Mutex::new(StorageDiffTracker::new(inputs.storage)));
        Ok(HostContext {
            data,
            secrets: Arc::new(HostSecrets::new(inputs.secrets, limiter.clone())),
            storage: Arc::new(HostStorage::new(tracker.clone(), limiter.clone())),
            chains: Arc::new(chains),
            http: Arc::new(LimitedHttp::new(inputs.http_client, limiter.clone())),
            tracker,
            limiter,
        })
    }
}

/// Host side of one run's context.
#[derive(Clone)]
pub struct HostContext {
    data: ContextData,
    secrets: Arc<HostSecrets>,
    storage: Arc<HostStorage>,
    chains: Arc<HostChains>,
    http: Arc<LimitedHttp>,
    tracker: Arc<Mutex<StorageDiffTracker>>,
    limiter: Arc<ResourceLimiter>,
}

impl HostContext {
    pub fn data(&self) -> &ContextData {
        &self.data
    }

    pub fn limiter(&self) -> &Arc<ResourceLimiter> {
        &self.limiter
    }

    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::new(
            self.data.clone(),
            self.secrets.clone(),
            self.storage.clone(),
            self.chains.clone(),
            self.http.clone(),
        )
    }

    /// Storage report of the run so far (partial if the run was cut short).
    pub fn storage_report(&self) -> StorageReport {
        self.tracker.lock().report()
    }

    /// Answer one accessor call forwarded by an isolated worker.
    pub async fn serve(&self, call: HostCall) -> Result<ReplyValue> {
        match call {
            HostCall::SecretGet { key } => Ok(ReplyValue::Text(self.secrets.get(&key).await?)),
            HostCall::StorageGet { key } => Ok(ReplyValue::Text(self.storage.get(&key).await?)),
            HostCall::StorageSet { key, value } => {
                self.storage.set(&key, &value).await?;
                Ok(ReplyValue::Unit)
            }
            HostCall::StorageDelete { key } => {
                self.storage.delete(&key).await?;
                Ok(ReplyValue::Unit)
            }
            HostCall::StorageKeys => Ok(ReplyValue::Keys(self.storage.keys().await?)),
            HostCall::Rpc { chain_id, method, params_json } => {
                let params: Vec<Value> = serde_json::from_str(&params_json)
                    .map_err(|e| HarnessError::Worker(format!("malformed rpc params: {e}")))?;
                let value = self.chains.request(chain_id, &method, params).await?;
                Ok(ReplyValue::Json(value.to_string()))
            }
            HostCall::Http(request) => Ok(ReplyValue::Http(self.http.fetch(request).await?)),
            HostCall::Fault(err) => {
                self.chains.fail(err);
                Ok(ReplyValue::Unit)
            }
        }
    }
}
