//! Deterministic request fingerprints.
//!
//! Parameters are flattened into a `BTreeMap`, serialized as canonical
//! JSON (sorted keys) and hashed with SHA-256. Key order in the input never
//! affects the result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::GenerateRequest;
use crate::{HeimdallError, Result};

/// 64-character lowercase hex SHA-256 digest identifying a logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a JSON object of request parameters.
///
/// Scalars are used as-is. Nested objects flatten to `parent.child` keys and
/// arrays to `parent.0`, `parent.1`, ...; a flattened key that collides with
/// an existing key is rejected.
///
/// ```rust
/// # use heimdall::cache::fingerprint::fingerprint;
/// # use serde_json::json;
/// let a = fingerprint(&json!({"prompt": "hi", "model": "gpt-4"})).unwrap();
/// let b = fingerprint(&json!({"model": "gpt-4", "prompt": "hi"})).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
pub fn fingerprint(params: &Value) -> Result<Fingerprint> {
    let Value::Object(map) = params else {
        return Err(HeimdallError::InvalidInput(
            "fingerprint parameters must be a JSON object".into(),
        ));
    };
    let mut flat = BTreeMap::new();
    for (key, value) in map {
        flatten_into(&mut flat, key.clone(), value)?;
    }
    digest(&flat)
}

fn flatten_into(flat: &mut BTreeMap<String, Value>, key: String, value: &Value) -> Result<()> {
    match value {
        Value::Object(children) if !children.is_empty() => {
            for (child, v) in children {
                flatten_into(flat, format!("{key}.{child}"), v)?;
            }
            Ok(())
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(flat, format!("{key}.{i}"), v)?;
            }
            Ok(())
        }
        scalar => {
            if flat.contains_key(&key) {
                return Err(HeimdallError::InvalidInput(format!(
                    "parameter key {key:?} is ambiguous after flattening"
                )));
            }
            flat.insert(key, canonical_scalar(scalar));
            Ok(())
        }
    }
}

/// `-0.0` and `0.0` are the same parameter value.
fn canonical_scalar(value: &Value) -> Value {
    match value.as_f64() {
        Some(n) if n == 0.0 && value.is_f64() => Value::from(0.0),
        _ => value.clone(),
    }
}

fn digest(flat: &BTreeMap<String, Value>) -> Result<Fingerprint> {
    let canonical = serde_json::to_string(flat)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Builder for the standard fingerprint parameter set.
///
/// Covers `prompt`, `model`, `temperature` and `max_tokens`; anything else
/// that changes the upstream result can be added with [`param`](Self::param).
/// `user_id` and `request_id` are deliberately not part of it.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    params: serde_json::Map<String, Value>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters of a generate request.
    pub fn from_request(request: &GenerateRequest) -> Self {
        Self::new()
            .param("prompt", request.prompt.as_str())
            .param("model", request.model.as_str())
            .param("temperature", request.temperature)
            .param("max_tokens", request.max_tokens)
    }

    /// Add or replace a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn fingerprint(&self) -> Result<Fingerprint> {
        fingerprint(&Value::Object(self.params.clone()))
    }
}
