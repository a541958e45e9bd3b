//! Optional-chaining accessors over untyped `xcresulttool` JSON.
//!
//! Legacy payloads wrap every scalar as `{"_type": .., "_value": ..}` and every
//! list as `{"_type": .., "_values": [..]}`. The accessors below unwrap both
//! forms and also accept plain scalars and arrays, so traversal code never has
//! to care which generation of the tool produced a field.

use serde_json::Value;

pub trait ValueExt {
    /// Field lookup that yields `None` for non-objects.
    fn field(&self, key: &str) -> Option<&Value>;

    /// The scalar behind `key`, unwrapping a `_value` wrapper.
    fn scalar(&self, key: &str) -> Option<&Value>;

    fn str_at(&self, key: &str) -> Option<&str>;

    /// A number, a numeric string, or a tool-formatted duration like `"1m 5s"`.
    fn f64_at(&self, key: &str) -> Option<f64>;

    /// The list behind `key`, unwrapping a `_values` wrapper. Missing or
    /// wrong-shaped fields give an empty slice.
    fn list(&self, key: &str) -> &[Value];

    /// Whether `key` holds a list in either form.
    fn has_list(&self, key: &str) -> bool;

    /// Reference identifier stored as `key.id._value`.
    fn reference_id(&self, key: &str) -> Option<&str>;
}

impl ValueExt for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    fn scalar(&self, key: &str) -> Option<&Value> {
        let value = self.field(key)?;
        match value {
            Value::Object(obj) => obj.get("_value"),
            Value::Null => None,
            other => Some(other),
        }
    }

    fn str_at(&self, key: &str) -> Option<&str> {
        self.scalar(key).and_then(Value::as_str)
    }

    fn f64_at(&self, key: &str) -> Option<f64> {
        match self.scalar(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_duration(s),
            _ => None,
        }
    }

    fn list(&self, key: &str) -> &[Value] {
        as_list(self.field(key))
    }

    fn has_list(&self, key: &str) -> bool {
        match self.field(key) {
            Some(Value::Array(_)) => true,
            Some(Value::Object(obj)) => matches!(obj.get("_values"), Some(Value::Array(_))),
            _ => false,
        }
    }

    fn reference_id(&self, key: &str) -> Option<&str> {
        self.field(key)?
            .str_at("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

fn as_list(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        Some(Value::Object(obj)) => match obj.get("_values") {
            Some(Value::Array(items)) => items,
            _ => &[],
        },
        _ => &[],
    }
}

/// Parses `"0.12"`, `"0.12s"`, `"1m 5s"`, `"1h 2m 3.5s"` and `"250ms"` into seconds.
pub fn parse_duration(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds);
    }

    let mut total = 0.0;
    for part in text.split_whitespace() {
        let (number, scale) = if let Some(n) = part.strip_suffix("ms") {
            (n, 0.001)
        } else if let Some(n) = part.strip_suffix('s') {
            (n, 1.0)
        } else if let Some(n) = part.strip_suffix('m') {
            (n, 60.0)
        } else if let Some(n) = part.strip_suffix('h') {
            (n, 3600.0)
        } else {
            return None;
        };
        total += number.parse::<f64>().ok()? * scale;
    }
    Some(total)
}
