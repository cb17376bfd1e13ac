//! Placeholder-template evaluation and the `States.*` intrinsic library.
//!
//! Grounded on `utils/json_ext.rs`'s `thiserror`+`miette` error-enum
//! style, generalized from JSON merge failures to intrinsic/path
//! failures; `States.UUID`/`States.MathRandom` reuse the `rand`/`uuid`
//! crates already in this workspace's dependency graph.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::EngineRng;
use crate::path::{PathError, RefPath};

#[derive(Debug, Error, Diagnostic, Clone)]
pub enum TemplateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("intrinsic expression '{0}' is malformed")]
    #[diagnostic(code(asl::intrinsics::malformed))]
    MalformedIntrinsic(String),

    #[error("unknown intrinsic function '{0}'")]
    #[diagnostic(code(asl::intrinsics::unknown))]
    UnknownIntrinsic(String),

    #[error("intrinsic '{name}' expected {expected} argument(s), got {got}")]
    #[diagnostic(code(asl::intrinsics::arity))]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("intrinsic '{name}' failed: {message}")]
    #[diagnostic(code(asl::intrinsics::failure))]
    Failure { name: String, message: String },

    #[error("reference path '{0}' did not resolve to a value")]
    #[diagnostic(code(asl::intrinsics::unresolved_reference))]
    UnresolvedReference(String),
}

impl TemplateError {
    /// Whether this failure is classified as `States.IntrinsicFailure`
    /// (true) or `States.ParameterPathFailure` (a bare reference-path
    /// lookup failure, false) — see spec §4.1.
    pub fn is_intrinsic_failure(&self) -> bool {
        !matches!(
            self,
            TemplateError::Path(_) | TemplateError::UnresolvedReference(_)
        )
    }
}

/// Recursively walk `template`, replacing every placeholder key `"k.$":
/// ref` with `"k": resolve(ref)` against `scope`. Non-placeholder leaves
/// are copied literally.
pub fn evaluate_template(
    template: &Value,
    scope: &Value,
    rng: &dyn EngineRng,
) -> Result<Value, TemplateError> {
    match template {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(target_key) = key.strip_suffix(".$") {
                    let resolved = evaluate_placeholder_value(value, scope, rng)?;
                    out.insert(target_key.to_string(), resolved);
                } else {
                    out.insert(key.clone(), evaluate_template(value, scope, rng)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate_template(item, scope, rng)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn evaluate_placeholder_value(
    value: &Value,
    scope: &Value,
    rng: &dyn EngineRng,
) -> Result<Value, TemplateError> {
    let text = value
        .as_str()
        .ok_or_else(|| TemplateError::MalformedIntrinsic(value.to_string()))?;

    if is_intrinsic_call(text) {
        evaluate_intrinsic(text, scope, rng)
    } else {
        resolve_reference(text, scope)
    }
}

fn resolve_reference(path: &str, scope: &Value) -> Result<Value, TemplateError> {
    let parsed = RefPath::parse(path)?;
    parsed
        .resolve(scope)
        .cloned()
        .ok_or_else(|| TemplateError::UnresolvedReference(path.to_string()))
}

fn is_intrinsic_call(text: &str) -> bool {
    text.starts_with("States.") && text.ends_with(')') && text.contains('(')
}

fn evaluate_intrinsic(text: &str, scope: &Value, rng: &dyn EngineRng) -> Result<Value, TemplateError> {
    let open = text
        .find('(')
        .ok_or_else(|| TemplateError::MalformedIntrinsic(text.to_string()))?;
    let name = &text[..open];
    let inner = &text[open + 1..text.len() - 1];
    let raw_args = split_args(inner).map_err(|_| TemplateError::MalformedIntrinsic(text.to_string()))?;

    let mut values = Vec::with_capacity(raw_args.len());
    for raw in &raw_args {
        values.push(evaluate_arg(raw, scope, rng)?);
    }

    match name {
        "States.Format" => {
            let (fmt, rest) = values
                .split_first()
                .ok_or_else(|| TemplateError::Arity {
                    name: name.to_string(),
                    expected: ">=1",
                    got: values.len(),
                })?;
            let fmt = fmt.as_str().ok_or_else(|| TemplateError::Failure {
                name: name.to_string(),
                message: "first argument must be a string".into(),
            })?;
            Ok(Value::String(format_string(fmt, rest)))
        }
        "States.StringToJson" => {
            let arg = expect_one(name, &values)?;
            let s = arg.as_str().ok_or_else(|| TemplateError::Failure {
                name: name.to_string(),
                message: "argument must be a string".into(),
            })?;
            serde_json::from_str(s).map_err(|e| TemplateError::Failure {
                name: name.to_string(),
                message: e.to_string(),
            })
        }
        "States.JsonToString" => {
            let arg = expect_one(name, &values)?;
            serde_json::to_string(&arg)
                .map(Value::String)
                .map_err(|e| TemplateError::Failure {
                    name: name.to_string(),
                    message: e.to_string(),
                })
        }
        "States.Array" => Ok(Value::Array(values)),
        "States.UUID" => {
            if !values.is_empty() {
                return Err(TemplateError::Arity {
                    name: name.to_string(),
                    expected: "0",
                    got: values.len(),
                });
            }
            Ok(Value::String(rng.uuid_v4().to_string()))
        }
        "States.MathRandom" => {
            let (lo, hi) = expect_two_ints(name, &values)?;
            Ok(Value::from(rng.range_inclusive(lo, hi)))
        }
        "States.MathAdd" => {
            let (a, b) = expect_two_ints(name, &values)?;
            Ok(Value::from(a + b))
        }
        other => Err(TemplateError::UnknownIntrinsic(other.to_string())),
    }
}

fn expect_one(name: &str, values: &[Value]) -> Result<Value, TemplateError> {
    if values.len() != 1 {
        return Err(TemplateError::Arity {
            name: name.to_string(),
            expected: "1",
            got: values.len(),
        });
    }
    Ok(values[0].clone())
}

fn expect_two_ints(name: &str, values: &[Value]) -> Result<(i64, i64), TemplateError> {
    if values.len() != 2 {
        return Err(TemplateError::Arity {
            name: name.to_string(),
            expected: "2",
            got: values.len(),
        });
    }
    let a = values[0].as_i64().ok_or_else(|| TemplateError::Failure {
        name: name.to_string(),
        message: "argument must be an integer".into(),
    })?;
    let b = values[1].as_i64().ok_or_else(|| TemplateError::Failure {
        name: name.to_string(),
        message: "argument must be an integer".into(),
    })?;
    Ok((a, b))
}

fn format_string(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut arg_iter = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') {
            chars.next();
            match arg_iter.next() {
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
                None => out.push_str("{}"),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn evaluate_arg(raw: &str, scope: &Value, rng: &dyn EngineRng) -> Result<Value, TemplateError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('$') {
        resolve_reference(trimmed, scope)
    } else if is_intrinsic_call(trimmed) {
        evaluate_intrinsic(trimmed, scope, rng)
    } else {
        serde_json::from_str::<Value>(trimmed)
            .map_err(|_| TemplateError::MalformedIntrinsic(raw.to_string()))
    }
}

/// Split a comma-separated intrinsic argument list, respecting nested
/// parentheses and quoted strings so commas inside them don't split.
fn split_args(inner: &str) -> Result<Vec<String>, ()> {
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut current = String::new();

    for c in inner.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(());
                }
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if in_string || depth != 0 {
        return Err(());
    }
    args.push(current);
    Ok(args.into_iter().map(|s| s.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OsRng;
    use serde_json::json;

    #[test]
    fn placeholder_resolves_reference() {
        let scope = json!({"a": {"b": 5}});
        let template = json!({"x.$": "$.a.b"});
        let out = evaluate_template(&template, &scope, &OsRng).unwrap();
        assert_eq!(out, json!({"x": 5}));
    }

    #[test]
    fn format_intrinsic_interpolates_args() {
        let scope = json!({"name": "Ada"});
        let template = json!({"greeting.$": "States.Format(\"Hello, {}!\", $.name)"});
        let out = evaluate_template(&template, &scope, &OsRng).unwrap();
        assert_eq!(out, json!({"greeting": "Hello, Ada!"}));
    }

    #[test]
    fn math_add_sums_integers() {
        let scope = json!({});
        let template = json!({"sum.$": "States.MathAdd(2, 3)"});
        let out = evaluate_template(&template, &scope, &OsRng).unwrap();
        assert_eq!(out, json!({"sum": 5}));
    }

    #[test]
    fn array_collects_args() {
        let scope = json!({"a": 1, "b": 2});
        let template = json!({"xs.$": "States.Array($.a, $.b, 3)"});
        let out = evaluate_template(&template, &scope, &OsRng).unwrap();
        assert_eq!(out, json!({"xs": [1, 2, 3]}));
    }

    #[test]
    fn json_round_trip() {
        let scope = json!({});
        let template = json!({"s.$": "States.JsonToString(States.Array(1, 2))"});
        let out = evaluate_template(&template, &scope, &OsRng).unwrap();
        assert_eq!(out, json!({"s": "[1,2]"}));
    }

    #[test]
    fn unresolved_reference_is_classified_as_parameter_path_failure() {
        let scope = json!({});
        let template = json!({"x.$": "$.missing"});
        let err = evaluate_template(&template, &scope, &OsRng).unwrap_err();
        assert!(!err.is_intrinsic_failure());
    }

    #[test]
    fn unknown_intrinsic_is_classified_as_intrinsic_failure() {
        let scope = json!({});
        let template = json!({"x.$": "States.Nope()"});
        let err = evaluate_template(&template, &scope, &OsRng).unwrap_err();
        assert!(err.is_intrinsic_failure());
    }
}
