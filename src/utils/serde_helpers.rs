use alloy_primitives::U256;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;

/// `U256` as a decimal string (gas prices are exchanged this way).
pub mod decimal_u256 {
    use super::*;

    pub fn serialize<S>(value: &U256, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        U256::from_str(s.trim()).map_err(D::Error::custom)
    }
}

/// JSON-RPC quantity: `u64` as a `0x`-prefixed hex string.
pub mod quantity {
    use super::*;

    pub fn serialize<S>(value: &u64, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        parse_quantity(&s).map_err(D::Error::custom)
    }

    /// Same as the parent module, for optional fields.
    pub mod option {
        use super::*;

        pub fn serialize<S>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => s.serialize_str(&format!("{v:#x}")),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(d: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = Option::<String>::deserialize(d)?;
            s.map(|s| parse_quantity(&s).map_err(D::Error::custom)).transpose()
        }
    }
}

/// Parse a hex quantity, with or without `0x` prefix.
pub fn parse_quantity(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {s:?}: {e}"))
}
