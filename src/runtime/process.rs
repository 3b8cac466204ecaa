//! Isolated executor: runs the handler in a `w3f worker` subprocess.
//!
//! The host sends `Start`, then serves the worker's accessor calls with the same limited
//! accessors used in-process until `Finished` arrives or the deadline passes. Calls that
//! only touch run state are served in arrival order; RPC and HTTP calls run concurrently
//! and their replies are written back as they complete.

use crate::context::HostContext;
use crate::runtime::builder::BuiltFunction;
use crate::runtime::executor::Executor;
use crate::runtime::outcome::ExecutionResult;
use crate::runtime::protocol::{decode, encode, FrameCodec, HostFrame, StartRun, WorkerFrame};
use crate::utils::{HarnessError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Subcommand that puts the binary in worker mode.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Advisory memory ceiling (MB) handed to the worker.
pub const MEMORY_ENV: &str = "W3F_MEMORY_MB";

/// Grace period for a finished worker to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(500);

pub struct ProcessExecutor {
    program: PathBuf,
}

impl ProcessExecutor {
    /// Worker spawned as `<program> worker`.
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

fn pipe_error(e: std::io::Error) -> HarnessError {
    HarnessError::Worker(format!("worker pipe: {e}"))
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, function: &BuiltFunction, host: &HostContext) -> Result<ExecutionResult> {
        let limiter = host.limiter();
        let mut child = Command::new(&self.program)
            .arg(WORKER_SUBCOMMAND)
            .env(MEMORY_ENV, limiter.limits().memory_mb.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Worker(format!("spawn {}: {e}", self.program.display())))?;
        info!(function = %function.name, pid = ?child.id(), "worker spawned");

        let stdin = child.stdin.take().ok_or_else(|| HarnessError::Worker("worker stdin unavailable".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| HarnessError::Worker("worker stdout unavailable".into()))?;
        let mut writer = FramedWrite::new(stdin, FrameCodec::new());
        let mut reader = FramedRead::new(stdout, FrameCodec::new());

        let context_json =
            serde_json::to_string(host.data()).map_err(|e| HarnessError::Worker(format!("encode context: {e}")))?;
        let start = HostFrame::Start(StartRun { function: function.name.clone(), context_json });
        writer.send(encode(&start)?).await.map_err(pipe_error)?;

        // In-flight RPC/HTTP calls; dropping the set aborts them.
        let mut in_flight: JoinSet<HostFrame> = JoinSet::new();
        let deadline = tokio::time::sleep(limiter.remaining());
        tokio::pin!(deadline);

        let result = loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(function = %function.name, "run deadline exceeded, killing worker");
                    break Err(limiter.trip(limiter.timeout_error()));
                }
                Some(joined) = in_flight.join_next() => {
                    let reply = joined.map_err(|e| HarnessError::Worker(format!("host call task: {e}")))?;
                    writer.send(encode(&reply)?).await.map_err(pipe_error)?;
                }
                frame = reader.next() => match frame {
                    Some(Ok(bytes)) => match decode::<WorkerFrame>(&bytes)? {
                        WorkerFrame::Call { id, call } if call.is_local() => {
                            let result = host.serve(call).await;
                            writer.send(encode(&HostFrame::Reply { id, result })?).await.map_err(pipe_error)?;
                        }
                        WorkerFrame::Call { id, call } => {
                            let host = host.clone();
                            in_flight.spawn(async move { HostFrame::Reply { id, result: host.serve(call).await } });
                        }
                        WorkerFrame::Finished(Ok(json)) => {
                            break serde_json::from_str::<ExecutionResult>(&json)
                                .map_err(|e| HarnessError::Worker(format!("malformed result: {e}")));
                        }
                        WorkerFrame::Finished(Err(err)) => break Err(err),
                    },
                    Some(Err(e)) => break Err(pipe_error(e)),
                    None => {
                        let status = child.wait().await.map_err(pipe_error)?;
                        break Err(HarnessError::Worker(format!("worker exited before finishing ({status})")));
                    }
                },
            }
        };

        in_flight.abort_all();
        drop(writer);
        let timed_out = matches!(result, Err(HarnessError::Timeout(_)));
        if !timed_out && tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
            debug!(function = %function.name, "worker still running after finishing");
        }
        let _ = child.kill().await;
        result
    }
}
