//! Tolerance checker: decodes the tool's stdout into a [`Summary`].
//!
//! Only `aggregate.spread` and `aggregate.intervalCompliance.*` are read.
//! Missing levels (or levels that are not JSON objects) behave like empty
//! mappings, so absent flags end up `false` and absent numbers `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub label: String,
    #[serde(rename = "allSchemesWithinTolerance")]
    pub all_schemes_within_tolerance: bool,
    #[serde(rename = "baseWithinTolerance")]
    pub base_within_tolerance: bool,
    #[serde(rename = "maxWidth")]
    pub max_width: Option<Value>,
    #[serde(rename = "maxAllowedWidth")]
    pub max_allowed_width: Option<Value>,
    pub spread: Option<Value>,
}

impl Summary {
    pub fn within_tolerance(&self) -> bool {
        self.all_schemes_within_tolerance && self.base_within_tolerance
    }
}

/// `aggregate.intervalCompliance` with every field optional.
#[derive(Debug, Clone, Default)]
struct IntervalCompliance {
    all_schemes_within_tolerance: Option<Value>,
    base_within_tolerance: Option<Value>,
    max_width: Option<Value>,
    max_allowed_width: Option<Value>,
}

impl IntervalCompliance {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            all_schemes_within_tolerance: obj.get("allSchemesWithinTolerance").cloned(),
            base_within_tolerance: obj.get("baseWithinTolerance").cloned(),
            max_width: obj.get("maxWidth").cloned(),
            max_allowed_width: obj.get("maxAllowedWidth").cloned(),
        }
    }
}

/// Parse stdout. Only invalid JSON is an error; shape problems degrade.
pub fn parse(label: &str, stdout: &str) -> Result<Summary, serde_json::Error> {
    let doc: Value = serde_json::from_str(stdout)?;
    Ok(extract(label, &doc))
}

pub fn extract(label: &str, doc: &Value) -> Summary {
    let empty = Map::new();
    let aggregate = object_at(doc, "aggregate").unwrap_or(&empty);
    let interval = aggregate
        .get("intervalCompliance")
        .and_then(Value::as_object)
        .map(IntervalCompliance::from_object)
        .unwrap_or_default();

    Summary {
        label: label.to_string(),
        all_schemes_within_tolerance: truthy(interval.all_schemes_within_tolerance.as_ref()),
        base_within_tolerance: truthy(interval.base_within_tolerance.as_ref()),
        max_width: non_null(interval.max_width),
        max_allowed_width: non_null(interval.max_allowed_width),
        spread: non_null(aggregate.get("spread").cloned()),
    }
}

fn object_at<'a>(doc: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    doc.as_object()?.get(key)?.as_object()
}

fn non_null(v: Option<Value>) -> Option<Value> {
    v.filter(|v| !v.is_null())
}

/// `null`, `false`, zero, `""`, `[]` and `{}` are falsy; everything else is truthy.
pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
