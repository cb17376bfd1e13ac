//! The six-stage I/O filter pipeline wrapped around every non-terminal
//! state's work step (spec §4.2): `InputPath` → `Parameters` → work →
//! `ResultSelector` → `ResultPath` → `OutputPath`.
//!
//! Grounded on `utils/json_ext.rs`'s traversal/merge style, generalized
//! from whole-document merge to path-scoped insertion, and on the
//! other-examples ASL emulator's `apply_result_path`/`apply_output_path`
//! (confirms the `$`/`null` special cases). Filter failures are surfaced
//! as ordinary [`ErrorRecord`]s so the retry/catch engine (§4.4) treats
//! them uniformly with task errors — the spec lists them alongside
//! `States.TaskFailed` in the same error taxonomy (§7).

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::context::EngineRng;
use crate::error::{names, ErrorRecord};
use crate::intrinsics::evaluate_template;
use crate::path::RefPath;

/// A parsed `InputPath`/`OutputPath`/`ResultPath` field: distinguishes
/// "key absent" (implicit `$`) from "key present as JSON `null`"
/// (empty-object or discard, depending on the stage) from an explicit
/// path string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathSpec {
    #[default]
    Default,
    Null,
    Path(String),
}

impl<'de> Deserialize<'de> for PathSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(PathSpec::Null),
            Value::String(s) => Ok(PathSpec::Path(s)),
            other => Err(serde::de::Error::custom(format!(
                "expected a path string or null, got {other}"
            ))),
        }
    }
}

/// Apply `InputPath` to the raw input of a state, producing the document
/// handed to `Parameters` (or directly to the work step if `Parameters`
/// is absent).
pub fn apply_input_path(raw_input: &Value, spec: &PathSpec) -> Result<Value, ErrorRecord> {
    match spec {
        PathSpec::Default => Ok(raw_input.clone()),
        PathSpec::Null => Ok(Value::Object(Default::default())),
        PathSpec::Path(path) => resolve_or_fail(raw_input, path, names::PARAMETER_PATH_FAILURE),
    }
}

/// Apply an optional `Parameters` template against the result of
/// `InputPath`, producing the effective input handed to the work step.
pub fn apply_parameters(
    filtered_input: &Value,
    parameters: Option<&Value>,
    rng: &dyn EngineRng,
) -> Result<Value, ErrorRecord> {
    match parameters {
        None => Ok(filtered_input.clone()),
        Some(template) => evaluate_template(template, filtered_input, rng).map_err(template_error),
    }
}

/// Apply an optional `ResultSelector` template against the raw result of
/// the work step.
pub fn apply_result_selector(
    raw_result: &Value,
    result_selector: Option<&Value>,
    rng: &dyn EngineRng,
) -> Result<Value, ErrorRecord> {
    match result_selector {
        None => Ok(raw_result.clone()),
        Some(template) => evaluate_template(template, raw_result, rng).map_err(template_error),
    }
}

/// Insert the (possibly selected) result into the raw input at
/// `ResultPath`, producing the combined document.
pub fn apply_result_path(
    raw_input_at_entry: &Value,
    result: Value,
    spec: &PathSpec,
) -> Result<Value, ErrorRecord> {
    match spec {
        PathSpec::Null => Ok(raw_input_at_entry.clone()),
        PathSpec::Default => Ok(result),
        PathSpec::Path(path) => {
            let parsed = RefPath::parse(path).map_err(|e| {
                ErrorRecord::new(names::RESULT_PATH_MATCH_FAILURE, Some(e.to_string()))
            })?;
            parsed.insert(raw_input_at_entry, result).map_err(|e| {
                ErrorRecord::new(names::RESULT_PATH_MATCH_FAILURE, Some(e.to_string()))
            })
        }
    }
}

/// Select a sub-document of the combined document as the state's final output.
pub fn apply_output_path(combined: &Value, spec: &PathSpec) -> Result<Value, ErrorRecord> {
    match spec {
        PathSpec::Default => Ok(combined.clone()),
        PathSpec::Null => Ok(Value::Object(Default::default())),
        PathSpec::Path(path) => resolve_or_fail(combined, path, names::PARAMETER_PATH_FAILURE),
    }
}

fn resolve_or_fail(document: &Value, path: &str, error_name: &str) -> Result<Value, ErrorRecord> {
    let parsed = RefPath::parse(path).map_err(|e| ErrorRecord::new(error_name, Some(e.to_string())))?;
    parsed
        .resolve(document)
        .cloned()
        .ok_or_else(|| ErrorRecord::new(error_name, Some(format!("path '{path}' did not resolve"))))
}

fn template_error(err: crate::intrinsics::TemplateError) -> ErrorRecord {
    let name = if err.is_intrinsic_failure() {
        names::INTRINSIC_FAILURE
    } else {
        names::PARAMETER_PATH_FAILURE
    };
    ErrorRecord::new(name, Some(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OsRng;
    use serde_json::json;

    #[test]
    fn default_input_path_is_identity() {
        let input = json!({"x": 1});
        let out = apply_input_path(&input, &PathSpec::Default).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn null_input_path_yields_empty_object() {
        let input = json!({"x": 1});
        let out = apply_input_path(&input, &PathSpec::Null).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn null_result_path_discards_result() {
        let raw_input = json!({"x": 1});
        let out = apply_result_path(&raw_input, json!({"y": 2}), &PathSpec::Null).unwrap();
        assert_eq!(out, raw_input);
    }

    #[test]
    fn explicit_result_path_inserts_result() {
        let raw_input = json!({"x": 1});
        let out = apply_result_path(
            &raw_input,
            json!({"ok": true}),
            &PathSpec::Path("$.r".into()),
        )
        .unwrap();
        assert_eq!(out, json!({"x": 1, "r": {"ok": true}}));
    }

    #[test]
    fn unresolved_input_path_fails_with_parameter_path_failure() {
        let input = json!({"x": 1});
        let err = apply_input_path(&input, &PathSpec::Path("$.missing".into())).unwrap_err();
        assert_eq!(err.error, names::PARAMETER_PATH_FAILURE);
    }

    #[test]
    fn parameters_template_uses_input_as_scope() {
        let filtered = json!({"a": 1});
        let template = json!({"b.$": "$.a"});
        let out = apply_parameters(&filtered, Some(&template), &OsRng).unwrap();
        assert_eq!(out, json!({"b": 1}));
    }
}
