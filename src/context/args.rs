//! Static inputs of a run: developer-supplied user args and chain metadata.

use crate::utils::serde_helpers::decimal_u256;
use crate::utils::{HarnessError, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Types a function manifest may declare for a user arg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "number[]")]
    NumberArray,
    #[serde(rename = "boolean[]")]
    BooleanArray,
}

impl ArgType {
    fn accepts(self, value: &Value) -> bool {
        let all = |check: fn(&Value) -> bool| value.as_array().is_some_and(|items| items.iter().all(check));
        match self {
            ArgType::String => value.is_string(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::StringArray => all(Value::is_string),
            ArgType::NumberArray => all(Value::is_number),
            ArgType::BooleanArray => all(Value::is_boolean),
        }
    }
}

/// User args of one function instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserArgs(BTreeMap<String, Value>);

impl UserArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the args against the manifest declaration.
    ///
    /// Declared args may be omitted (function bodies apply their own defaults), but every
    /// supplied arg must be declared and carry the declared type.
    pub fn validate(&self, declared: &BTreeMap<String, ArgType>) -> Result<()> {
        for (key, value) in &self.0 {
            let ty = declared
                .get(key)
                .ok_or_else(|| HarnessError::InvalidUserArgs(format!("'{key}' is not declared in schema")))?;
            if !ty.accepts(value) {
                return Err(HarnessError::InvalidUserArgs(format!("'{key}' must be of type {ty:?}, got {value}")));
            }
        }
        Ok(())
    }
}

/// Read-only chain metadata supplied by the calling environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoArgs {
    pub chain_id: u64,
    /// Current block timestamp (unix seconds).
    #[serde(default)]
    pub block_time: u64,
    #[serde(with = "decimal_u256")]
    pub gas_price: U256,
}

impl GelatoArgs {
    pub fn new(chain_id: u64, block_time: u64, gas_price: U256) -> Self {
        Self { chain_id, block_time, gas_price }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared() -> BTreeMap<String, ArgType> {
        serde_json::from_value(json!({
            "oracle": "string",
            "threshold": "number",
            "tokens": "string[]",
        }))
        .unwrap()
    }

    #[test]
    fn accepts_matching_and_omitted_args() {
        let args = UserArgs::new().with("oracle", "0xabc").with("tokens", json!(["a", "b"]));
        args.validate(&declared()).unwrap();
        assert_eq!(args.get_str("oracle"), Some("0xabc"));
        assert_eq!(args.get_f64("threshold"), None);
    }

    #[test]
    fn rejects_wrong_type_and_undeclared() {
        let wrong = UserArgs::new().with("threshold", "high");
        assert!(matches!(wrong.validate(&declared()), Err(HarnessError::InvalidUserArgs(_))));

        let mixed = UserArgs::new().with("tokens", json!(["a", 1]));
        assert!(mixed.validate(&declared()).is_err());

        let extra = UserArgs::new().with("currency", "ethereum");
        assert!(extra.validate(&declared()).is_err());
    }

    #[test]
    fn gelato_args_wire_shape() {
        let args: GelatoArgs =
            serde_json::from_value(json!({"chainId": 5, "gasPrice": "100000000000"})).unwrap();
        assert_eq!(args.block_time, 0);
        assert_eq!(args.gas_price, U256::from(100_000_000_000u64));
    }
}
