//! Function results and the normalized run outcome.

use crate::context::storage::StorageReport;
use crate::runtime::limiter::Usage;
use crate::utils::HarnessError;
use alloy_primitives::{Address, Bytes};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// One transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
}

impl Call {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, data: data.into() }
    }
}

/// A single call or an ordered multi-call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallData {
    Single(Call),
    Multi(Vec<Call>),
}

impl CallData {
    pub fn calls(&self) -> &[Call] {
        match self {
            CallData::Single(call) => std::slice::from_ref(call),
            CallData::Multi(calls) => calls,
        }
    }
}

/// Decision returned by a function body, serialized with a boolean `canExec` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawResult", into = "RawResult")]
pub enum ExecutionResult {
    /// Nothing to submit.
    Skip { message: String },
    Exec { call_data: CallData },
}

impl ExecutionResult {
    pub fn skip(message: impl Into<String>) -> Self {
        ExecutionResult::Skip { message: message.into() }
    }

    pub fn exec(call: Call) -> Self {
        ExecutionResult::Exec { call_data: CallData::Single(call) }
    }

    pub fn exec_multi(calls: Vec<Call>) -> Self {
        ExecutionResult::Exec { call_data: CallData::Multi(calls) }
    }

    pub fn can_exec(&self) -> bool {
        matches!(self, ExecutionResult::Exec { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    can_exec: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_data: Option<CallData>,
}

impl TryFrom<RawResult> for ExecutionResult {
    type Error = String;

    fn try_from(raw: RawResult) -> Result<Self, Self::Error> {
        match (raw.can_exec, raw.message, raw.call_data) {
            (true, _, Some(call_data)) => Ok(ExecutionResult::Exec { call_data }),
            (true, _, None) => Err("canExec is true but callData is missing".into()),
            (false, message, _) => Ok(ExecutionResult::Skip { message: message.unwrap_or_default() }),
        }
    }
}

impl From<ExecutionResult> for RawResult {
    fn from(result: ExecutionResult) -> Self {
        match result {
            ExecutionResult::Skip { message } => RawResult { can_exec: false, message: Some(message), call_data: None },
            ExecutionResult::Exec { call_data } => RawResult { can_exec: true, message: None, call_data: Some(call_data) },
        }
    }
}

/// Run statistics reported with every outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub duration_ms: u64,
    pub requests: u64,
    pub rpc_calls: u64,
    pub download: u64,
    pub upload: u64,
}

impl RunStats {
    pub fn new(duration: Duration, usage: Usage) -> Self {
        Self {
            duration_ms: duration.as_millis() as u64,
            requests: usage.requests,
            rpc_calls: usage.rpc_calls,
            download: usage.download,
            upload: usage.upload,
        }
    }
}

/// Normalized outcome of one run. Holding a `Result` makes "exactly one of result or
/// error" hold by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub outcome: Result<ExecutionResult, HarnessError>,
    pub storage: StorageReport,
    pub stats: RunStats,
}

impl RunOutcome {
    /// Combine the handler's result with the run's latched fault; the fault wins.
    pub fn normalize(
        handler: Result<ExecutionResult, HarnessError>,
        fault: Option<HarnessError>,
        storage: StorageReport,
        stats: RunStats,
    ) -> Self {
        let outcome = match fault {
            Some(err) => Err(err),
            None => handler,
        };
        Self { outcome, storage, stats }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&HarnessError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    name: &'a str,
    message: String,
}

impl Serialize for RunOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RunOutcome", 4)?;
        s.serialize_field("success", &self.success())?;
        match &self.outcome {
            Ok(result) => s.serialize_field("result", result)?,
            Err(err) => s.serialize_field("error", &ErrorBody { name: err.name(), message: err.to_string() })?,
        }
        s.serialize_field("storage", &self.storage)?;
        s.serialize_field("stats", &self.stats)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::storage::StorageMap;
    use serde_json::json;

    #[test]
    fn can_exec_tag_shapes() {
        let skip = serde_json::to_value(ExecutionResult::skip("Time not elapsed")).unwrap();
        assert_eq!(skip, json!({"canExec": false, "message": "Time not elapsed"}));

        let exec = ExecutionResult::exec(Call::new(Address::ZERO, vec![0xde, 0xad]));
        let v = serde_json::to_value(&exec).unwrap();
        assert_eq!(v["canExec"], true);
        assert_eq!(v["callData"]["data"], "0xdead");

        let multi: ExecutionResult = serde_json::from_value(json!({
            "canExec": true,
            "callData": [
                {"to": "0x0000000000000000000000000000000000000001", "data": "0x01"},
                {"to": "0x0000000000000000000000000000000000000002", "data": "0x02"}
            ]
        }))
        .unwrap();
        match multi {
            ExecutionResult::Exec { call_data } => assert_eq!(call_data.calls().len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        assert!(serde_json::from_value::<ExecutionResult>(json!({"canExec": true})).is_err());
    }

    #[test]
    fn fault_takes_precedence() {
        let outcome = RunOutcome::normalize(
            Ok(ExecutionResult::skip("swallowed")),
            Some(HarnessError::Timeout(100)),
            StorageReport::unchanged(StorageMap::new()),
            RunStats::default(),
        );
        assert!(!outcome.success());
        assert_eq!(outcome.error(), Some(&HarnessError::Timeout(100)));

        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"]["name"], "Timeout");
        assert!(v.get("result").is_none());
        assert_eq!(v["storage"]["state"], "unchanged");
        assert_eq!(v["stats"]["durationMs"], 0);
    }
}
