//! JSON schemas: the one `xcresulttool` documents for its own output, checked
//! against fetched data as an advisory, and the one for our `Report`.

use crate::report::Report;
use serde_json::Value;
use std::fmt;

/// Slice `output` from its first `{`, dropping any banner text before the JSON.
pub fn extract_json_from_output(output: &str) -> Result<String, String> {
    if let Some(start_pos) = output.find('{') {
        let json_portion = &output[start_pos..];
        Ok(json_portion.to_string())
    } else {
        Err("No JSON found in xcresulttool output".to_string())
    }
}

/// First JSON value in `output`. Text before the opening `{` and anything after
/// the value itself are ignored.
pub fn parse_json_from_output(output: &str) -> Result<Value, String> {
    let json = extract_json_from_output(output)?;
    match serde_json::Deserializer::from_str(&json)
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(format!("Invalid JSON in xcresulttool output: {}", e)),
        None => Err("No JSON found in xcresulttool output".to_string()),
    }
}

/// JSON Schema of the report this crate produces.
pub fn report_schema() -> Value {
    schemars::schema_for!(Report).to_value()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWarning {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A compiled `xcresulttool` schema, checked against fetched payloads.
pub struct SchemaCheck {
    validator: jsonschema::Validator,
}

impl SchemaCheck {
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| format!("Invalid xcresulttool schema: {}", e))?;
        Ok(Self { validator })
    }

    /// The documented schema describes `get test-results tests` output only.
    pub fn applies_to(data: &Value) -> bool {
        data.get("testNodes").is_some()
    }

    pub fn validate(&self, data: &Value) -> Vec<SchemaWarning> {
        self.validator
            .iter_errors(data)
            .map(|error| {
                let path = error.instance_path.to_string();
                SchemaWarning {
                    path: if path.is_empty() { "/".to_string() } else { path },
                    message: error.to_string(),
                }
            })
            .collect()
    }

    /// Logs every mismatch; never fails.
    pub fn warn_on_mismatch(&self, data: &Value) -> usize {
        let warnings = self.validate(data);
        for warning in &warnings {
            tracing::warn!(path = %warning.path, "schema mismatch: {}", warning.message);
        }
        warnings.len()
    }
}
