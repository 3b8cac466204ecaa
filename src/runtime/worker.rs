//! Worker side of an isolated run (`w3f worker`).
//!
//! Reads `Start` from stdin, builds an [`ExecutionContext`] whose accessors forward
//! every call to the host, runs the handler and reports `Finished` on stdout.

use crate::context::http::{HttpAccess, HttpRequest, HttpResponse};
use crate::context::provider::ChainAccess;
use crate::context::secrets::SecretsAccess;
use crate::context::storage::StorageAccess;
use crate::context::{ContextData, ExecutionContext};
use crate::runtime::executor::handler_outcome;
use crate::runtime::module::FunctionCatalog;
use crate::runtime::process::MEMORY_ENV;
use crate::runtime::protocol::{decode, encode, FrameCodec, HostCall, HostFrame, ReplyValue, WorkerFrame};
use crate::utils::{HarnessError, Result};
use anyhow::Context;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

type Pending = Mutex<HashMap<u64, oneshot::Sender<Result<ReplyValue>>>>;

/// Request/reply link to the host.
struct WorkerLink {
    out: mpsc::UnboundedSender<WorkerFrame>,
    pending: Pending,
    next_id: AtomicU64,
}

impl WorkerLink {
    async fn call(&self, call: HostCall) -> Result<ReplyValue> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        self.out
            .send(WorkerFrame::Call { id, call })
            .map_err(|_| HarnessError::Worker("host link closed".into()))?;
        rx.await.map_err(|_| HarnessError::Worker("host link closed".into()))?
    }

    /// Fire-and-forget call; the reply is dropped.
    fn notify(&self, call: HostCall) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.out.send(WorkerFrame::Call { id, call });
    }

    fn resolve(&self, id: u64, result: Result<ReplyValue>) {
        if let Some(tx) = self.pending.lock().remove(&id) {
            let _ = tx.send(result);
        }
    }
}

fn unexpected(reply: ReplyValue) -> HarnessError {
    HarnessError::Worker(format!("unexpected reply {reply:?}"))
}

/// Every context capability, forwarded to the host.
#[derive(Clone)]
pub struct RemoteAccess {
    link: Arc<WorkerLink>,
}

#[async_trait]
impl SecretsAccess for RemoteAccess {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.link.call(HostCall::SecretGet { key: key.to_string() }).await? {
            ReplyValue::Text(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }
}

#[async_trait]
impl StorageAccess for RemoteAccess {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.link.call(HostCall::StorageGet { key: key.to_string() }).await? {
            ReplyValue::Text(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let call = HostCall::StorageSet { key: key.to_string(), value: value.to_string() };
        match self.link.call(call).await? {
            ReplyValue::Unit => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.link.call(HostCall::StorageDelete { key: key.to_string() }).await? {
            ReplyValue::Unit => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        match self.link.call(HostCall::StorageKeys).await? {
            ReplyValue::Keys(keys) => Ok(keys),
            other => Err(unexpected(other)),
        }
    }
}

#[async_trait]
impl ChainAccess for RemoteAccess {
    async fn request(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value> {
        let params_json = Value::Array(params).to_string();
        let call = HostCall::Rpc { chain_id, method: method.to_string(), params_json };
        match self.link.call(call).await? {
            ReplyValue::Json(raw) => {
                serde_json::from_str(&raw).map_err(|e| HarnessError::Worker(format!("malformed rpc result: {e}")))
            }
            other => Err(unexpected(other)),
        }
    }

    fn fail(&self, err: HarnessError) -> HarnessError {
        self.link.notify(HostCall::Fault(err.clone()));
        err
    }
}

#[async_trait]
impl HttpAccess for RemoteAccess {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        match self.link.call(HostCall::Http(request)).await? {
            ReplyValue::Http(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }
}

/// Worker over the process's stdin/stdout.
pub async fn run_worker(catalog: FunctionCatalog) -> anyhow::Result<()> {
    // advisory only: not enforced on the worker's allocations
    let memory_mb = memory_ceiling(std::env::var(MEMORY_ENV).ok());
    info!(?memory_mb, "worker memory ceiling");
    serve_worker(catalog, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Memory ceiling in MB from the host-provided env value, if well formed.
fn memory_ceiling(raw: Option<String>) -> Option<u32> {
    raw?.trim().parse().ok()
}

/// Worker over arbitrary pipes.
pub async fn serve_worker<R, W>(catalog: FunctionCatalog, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = FramedRead::new(input, FrameCodec::new());
    let mut writer = FramedWrite::new(output, FrameCodec::new());

    let first = reader.next().await.context("host closed before start")?.context("read start frame")?;
    let start = match decode::<HostFrame>(&first)? {
        HostFrame::Start(start) => start,
        other => anyhow::bail!("expected start frame, got {other:?}"),
    };
    let data: ContextData = serde_json::from_str(&start.context_json).context("decode context data")?;
    info!(function = %start.function, "worker started");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WorkerFrame>();
    let link = Arc::new(WorkerLink { out: out_tx, pending: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) });

    // Writer: drains outbound frames, stops after `Finished`.
    let write_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let done = matches!(frame, WorkerFrame::Finished(_));
            writer.send(encode(&frame)?).await.map_err(|e| HarnessError::Worker(e.to_string()))?;
            if done {
                break;
            }
        }
        Ok::<_, HarnessError>(())
    });

    // Reader: routes replies to pending calls.
    let reader_link = link.clone();
    let read_task = tokio::spawn(async move {
        while let Some(frame) = reader.next().await {
            match frame.map_err(|e| HarnessError::Worker(e.to_string())).and_then(|b| decode::<HostFrame>(&b)) {
                Ok(HostFrame::Reply { id, result }) => reader_link.resolve(id, result),
                Ok(other) => warn!(?other, "unexpected host frame"),
                Err(e) => {
                    warn!(error = %e, "host link broken");
                    break;
                }
            }
        }
        // fail whatever is still waiting
        for (_, tx) in reader_link.pending.lock().drain() {
            let _ = tx.send(Err(HarnessError::Worker("host link closed".into())));
        }
    });

    let remote = Arc::new(RemoteAccess { link: link.clone() });
    let outcome = match catalog.load(&start.function) {
        Ok(handler) => {
            let ctx = ExecutionContext::new(data, remote.clone(), remote.clone(), remote.clone(), remote);
            handler_outcome(tokio::spawn(handler(ctx)).await)
        }
        Err(err) => Err(err),
    };
    let finished = outcome.and_then(|result| {
        serde_json::to_string(&result).map_err(|e| HarnessError::Worker(format!("encode result: {e}")))
    });
    debug!(ok = finished.is_ok(), "handler finished");

    link.out.send(WorkerFrame::Finished(finished)).map_err(|_| anyhow::anyhow!("writer task gone"))?;
    write_task.await.context("writer task")??;
    read_task.abort();
    Ok(())
}
