//! Parameter documents.
//!
//! Callers hand the engine an opaque JSON document. Two shapes are accepted:
//!
//! - an object mapping names to values, taken as-is
//! - a list of `{name, type, value, multiSelect}` entries, coerced by type
//!
//! Either shape may arrive wrapped in a JSON string (double-encoded), which
//! is unwrapped first.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One entry of the list form.
#[derive(Debug, Deserialize)]
struct ParameterEntry {
    #[serde(alias = "Name")]
    name: Option<String>,
    #[serde(rename = "type", alias = "Type", default)]
    kind: Option<String>,
    #[serde(alias = "Value", default)]
    value: Value,
    #[serde(rename = "multiSelect", alias = "MultiSelect", default)]
    multi_select: bool,
}

/// Named script parameters after coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: Map<String, Value>,
}

impl ParameterSet {
    /// Parse a parameter document. Empty or blank input yields an empty set.
    pub fn parse(document: &str) -> Result<Self> {
        let trimmed = document.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut value: Value = serde_json::from_str(trimmed)
            .map_err(|e| Error::InvalidParameters(format!("not valid JSON: {}", e)))?;

        if let Value::String(inner) = &value {
            if inner.trim().is_empty() {
                return Ok(Self::default());
            }
            value = serde_json::from_str(inner).map_err(|e| {
                Error::InvalidParameters(format!("wrapped document is not valid JSON: {}", e))
            })?;
        }

        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(values) => Ok(Self { values }),
            Value::Array(items) => Self::from_entries(items),
            other => Err(Error::InvalidParameters(format!(
                "expected an object or a list of entries, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn from_entries(items: Vec<Value>) -> Result<Self> {
        let mut values = Map::new();
        for (index, item) in items.into_iter().enumerate() {
            let entry: ParameterEntry = serde_json::from_value(item)
                .map_err(|e| Error::InvalidParameters(format!("entry {}: {}", index, e)))?;

            let Some(name) = entry.name.filter(|n| !n.is_empty()) else {
                tracing::warn!("Skipping parameter entry {} without a name", index);
                continue;
            };

            match coerce(entry.kind.as_deref(), entry.value, entry.multi_select) {
                Some(value) => {
                    values.insert(name, value);
                }
                None => tracing::debug!("Parameter '{}' has no usable value, skipped", name),
            }
        }
        Ok(Self { values })
    }

    /// Look up a value by name. Exact matches win over case-insensitive ones.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Look up a value and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Coerce a list-form value according to its declared type.
///
/// `None` means the entry carries nothing usable and is dropped.
fn coerce(kind: Option<&str>, value: Value, multi_select: bool) -> Option<Value> {
    if value.is_null() {
        return None;
    }

    match kind.unwrap_or("string") {
        "string" if multi_select => Some(coerce_list(value)),
        "string" => Some(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
        "number" => match value {
            Value::Number(n) => Some(Value::Number(n)),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Some(Value::from(i))
                } else {
                    s.parse::<f64>().ok().map(Value::from)
                }
            }
            _ => None,
        },
        "boolean" => match value {
            Value::Bool(b) => Some(Value::Bool(b)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        },
        "xyz" => Some(coerce_point(&value)),
        _ => Some(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
    }
}

/// Multi-select values: a list, a JSON list inside a string, or a
/// comma-separated string.
fn coerce_list(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(s),
                    other => Value::String(other.to_string()),
                })
                .collect(),
        ),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                match serde_json::from_str::<Vec<String>>(trimmed) {
                    Ok(items) => items.into_iter().map(Value::String).collect(),
                    Err(_) => Value::Array(vec![Value::String(s)]),
                }
            } else {
                trimmed
                    .split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect()
            }
        }
        other => Value::String(other.to_string()),
    }
}

/// `"x,y,z"` into `[x, y, z]`; anything unparsable is the origin.
fn coerce_point(value: &Value) -> Value {
    let origin = || Value::from(vec![0.0, 0.0, 0.0]);
    let Some(text) = value.as_str() else {
        return origin();
    };

    let coords: Vec<f64> = text
        .split(',')
        .filter_map(|part| part.trim().parse::<f64>().ok())
        .collect();
    if coords.len() == 3 && text.split(',').count() == 3 {
        Value::from(coords)
    } else {
        origin()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
