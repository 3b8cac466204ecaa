//! Host/worker wire protocol for isolated runs.
//!
//! Frames are bincode-encoded and length-delimited over the worker's stdin (host to
//! worker) and stdout (worker to host). JSON payloads (context data, RPC params and
//! results, the function's result) travel as strings since bincode cannot carry
//! `serde_json::Value`.

use crate::context::http::{HttpRequest, HttpResponse};
use crate::utils::{HarnessError, Result};
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRun {
    pub function: String,
    /// JSON-encoded `ContextData`.
    pub context_json: String,
}

/// Host to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostFrame {
    Start(StartRun),
    Reply { id: u64, result: std::result::Result<ReplyValue, HarnessError> },
}

/// Worker to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerFrame {
    Call { id: u64, call: HostCall },
    /// JSON-encoded `ExecutionResult`, or the handler's failure.
    Finished(std::result::Result<String, HarnessError>),
}

/// Accessor call forwarded from the worker to the host's limited accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCall {
    SecretGet { key: String },
    StorageGet { key: String },
    StorageSet { key: String, value: String },
    StorageDelete { key: String },
    StorageKeys,
    Rpc { chain_id: u64, method: String, params_json: String },
    Http(HttpRequest),
    /// Fatal fault raised worker-side; latched by the host.
    Fault(HarnessError),
}

impl HostCall {
    /// Calls that only touch in-memory run state; served in order on the reader task.
    pub fn is_local(&self) -> bool {
        !matches!(self, HostCall::Rpc { .. } | HostCall::Http(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyValue {
    Text(Option<String>),
    Unit,
    Keys(Vec<String>),
    Json(String),
    Http(HttpResponse),
}

pub fn encode<T: Serialize>(frame: &T) -> Result<Bytes> {
    bincode::serialize(frame)
        .map(Bytes::from)
        .map_err(|e| HarnessError::Worker(format!("encode frame: {e}")))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| HarnessError::Worker(format!("decode frame: {e}")))
}

/// Raw frame codec over a length-delimited stream. Serialization happens in [`encode`]
/// and [`decode`].
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { inner: LengthDelimitedCodec::builder().max_frame_length(MAX_FRAME_LEN).new_codec() }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(buf) => Ok(Some(buf.freeze())),
            None => Ok(None),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        self.inner.encode(item, dst)
    }
}
