//! The JSON document agents send once decrypted and inflated.

use crate::error::IngestError;
use serde_json::{Map, Value};

const FIELDS: [&str; 3] = ["project", "source", "data"];

/// Top-level payload before project/source admission.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEnvelope {
    pub project: String,
    pub source: String,
    pub data: Vec<Value>,
}

impl RawEnvelope {
    /// Parse the envelope, requiring exactly `project`, `source` and `data`.
    ///
    /// `data` must be an array but may be empty here; emptiness is an
    /// admission decision.
    pub fn parse(bytes: &[u8]) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| IngestError::Format(format!("json: {e}")))?;
        let Value::Object(mut obj) = value else {
            return Err(IngestError::Format("payload is not a JSON object".to_string()));
        };

        if let Some(extra) = obj.keys().find(|k| !FIELDS.contains(&k.as_str())) {
            return Err(IngestError::Format(format!("unexpected field `{extra}`")));
        }

        let project = take_string(&mut obj, "project")?;
        let source = take_string(&mut obj, "source")?;
        let data = match obj.remove("data") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(IngestError::Format("`data` is not an array".to_string())),
            None => return Err(IngestError::Format("missing field `data`".to_string())),
        };

        Ok(Self {
            project,
            source,
            data,
        })
    }
}

fn take_string(obj: &mut Map<String, Value>, field: &str) -> Result<String, IngestError> {
    match obj.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(IngestError::Format(format!("`{field}` is not a string"))),
        None => Err(IngestError::Format(format!("missing field `{field}`"))),
    }
}
