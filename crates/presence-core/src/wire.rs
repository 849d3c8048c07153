//! Lenient decoding helpers for backend JSON.
//!
//! The backend serialises employee and record ids as integers in some
//! endpoints and strings in others, and confidence as either int or float.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::types::clamp_confidence;

pub(crate) fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

pub(crate) fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

pub(crate) fn confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    Ok(opt_confidence(d)?.unwrap_or(0.0))
}

pub(crate) fn opt_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
    let raw = Option::<f64>::deserialize(d)?;
    Ok(raw.map(|v| clamp_confidence(v as f32)))
}
