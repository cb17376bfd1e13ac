//! Choice state (spec §4.5): evaluates `Choices[]` in order, routing to
//! the first matching rule's `Next`, else `Default`, else
//! `States.NoChoiceMatched`. Only `InputPath`/`OutputPath` apply — a
//! Choice never touches `Parameters`/`Result*` and never changes the
//! document.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::context::DefaultRetry;
use crate::definition::{ChoiceRule, ChoiceTest, Comparator};
use crate::error::{names, ErrorRecord};
use crate::filters::{apply_input_path, apply_output_path};
use crate::machine::CompiledState;
use crate::path::RefPath;
use crate::states::{run_with_retry, Next};

pub async fn run(
    raw_input: &Value,
    state: &CompiledState,
    choices: &[ChoiceRule],
    default: Option<&str>,
    defaults: &DefaultRetry,
) -> Result<(Value, Next), ErrorRecord> {
    run_with_retry(raw_input, &state.retry, &state.catch, defaults, || async {
        let filtered = apply_input_path(raw_input, &state.input_path)?;

        let matched = choices.iter().find(|rule| evaluate_rule(rule, &filtered));
        let next_name = match matched {
            Some(rule) => rule
                .next
                .clone()
                .expect("build_machine guarantees top-level Choices[] entries carry Next"),
            None => default
                .map(str::to_string)
                .ok_or_else(|| ErrorRecord::new(names::NO_CHOICE_MATCHED, None))?,
        };

        let output = apply_output_path(&filtered, &state.output_path)?;
        Ok((output, Next::Named(next_name)))
    })
    .await
}

/// Evaluate one `Choices[]` entry (or a nested `And`/`Or`/`Not` rule)
/// against `document`. A missing left-hand reference yields `false`
/// rather than an error, except for the `Is*` presence predicates.
fn evaluate_rule(rule: &ChoiceRule, document: &Value) -> bool {
    match &rule.test {
        ChoiceTest::And { and } => and.iter().all(|r| evaluate_rule(r, document)),
        ChoiceTest::Or { or } => or.iter().any(|r| evaluate_rule(r, document)),
        ChoiceTest::Not { not } => !evaluate_rule(not, document),
        ChoiceTest::Comparator { variable, comparator } => {
            evaluate_comparator(variable, comparator, document)
        }
    }
}

fn evaluate_comparator(variable: &str, comparator: &Comparator, document: &Value) -> bool {
    let resolved = RefPath::parse(variable)
        .ok()
        .and_then(|p| p.resolve(document));

    match comparator {
        Comparator::IsNull(expected) => matches!(resolved, Some(Value::Null)) == *expected,
        Comparator::IsPresent(expected) => resolved.is_some() == *expected,
        Comparator::IsNumeric(expected) => {
            matches!(resolved, Some(v) if v.is_number()) == *expected
        }
        Comparator::IsString(expected) => {
            matches!(resolved, Some(v) if v.is_string()) == *expected
        }
        Comparator::IsBoolean(expected) => {
            matches!(resolved, Some(v) if v.is_boolean()) == *expected
        }
        Comparator::IsTimestamp(expected) => {
            matches!(resolved, Some(Value::String(s)) if parse_timestamp(s).is_some()) == *expected
        }
        _ => {
            let Some(value) = resolved else { return false };
            evaluate_typed(comparator, value, document)
        }
    }
}

fn evaluate_typed(comparator: &Comparator, value: &Value, document: &Value) -> bool {
    use std::cmp::Ordering;

    macro_rules! string_cmp {
        ($lhs:expr, $rhs:expr, $ord:expr) => {
            value
                .as_str()
                .zip($lhs($rhs, document))
                .map(|(l, r)| l.cmp(r) == $ord)
                .unwrap_or(false)
        };
    }

    match comparator {
        Comparator::StringEquals(rhs) => value.as_str() == Some(rhs.as_str()),
        Comparator::StringEqualsPath(path) => string_cmp!(resolve_string, path, Ordering::Equal),
        Comparator::StringLessThan(rhs) => value.as_str().is_some_and(|s| s < rhs.as_str()),
        Comparator::StringLessThanPath(path) => string_cmp!(resolve_string, path, Ordering::Less),
        Comparator::StringGreaterThan(rhs) => value.as_str().is_some_and(|s| s > rhs.as_str()),
        Comparator::StringGreaterThanPath(path) => {
            string_cmp!(resolve_string, path, Ordering::Greater)
        }
        Comparator::StringLessThanEquals(rhs) => value.as_str().is_some_and(|s| s <= rhs.as_str()),
        Comparator::StringLessThanEqualsPath(path) => value
            .as_str()
            .zip(resolve_string(path, document))
            .is_some_and(|(l, r)| l <= r),
        Comparator::StringGreaterThanEquals(rhs) => {
            value.as_str().is_some_and(|s| s >= rhs.as_str())
        }
        Comparator::StringGreaterThanEqualsPath(path) => value
            .as_str()
            .zip(resolve_string(path, document))
            .is_some_and(|(l, r)| l >= r),
        Comparator::StringMatches(pattern) => {
            value.as_str().is_some_and(|s| glob_matches(pattern, s))
        }

        Comparator::NumericEquals(rhs) => value.as_f64() == Some(*rhs),
        Comparator::NumericEqualsPath(path) => {
            numeric_cmp(value, path, document, |l, r| l == r)
        }
        Comparator::NumericLessThan(rhs) => value.as_f64().is_some_and(|v| v < *rhs),
        Comparator::NumericLessThanPath(path) => numeric_cmp(value, path, document, |l, r| l < r),
        Comparator::NumericGreaterThan(rhs) => value.as_f64().is_some_and(|v| v > *rhs),
        Comparator::NumericGreaterThanPath(path) => {
            numeric_cmp(value, path, document, |l, r| l > r)
        }
        Comparator::NumericLessThanEquals(rhs) => value.as_f64().is_some_and(|v| v <= *rhs),
        Comparator::NumericLessThanEqualsPath(path) => {
            numeric_cmp(value, path, document, |l, r| l <= r)
        }
        Comparator::NumericGreaterThanEquals(rhs) => value.as_f64().is_some_and(|v| v >= *rhs),
        Comparator::NumericGreaterThanEqualsPath(path) => {
            numeric_cmp(value, path, document, |l, r| l >= r)
        }

        Comparator::BooleanEquals(rhs) => value.as_bool() == Some(*rhs),
        Comparator::BooleanEqualsPath(path) => {
            let rhs = RefPath::parse(path).ok().and_then(|p| p.resolve(document));
            value.as_bool() == rhs.and_then(Value::as_bool)
        }

        Comparator::TimestampEquals(rhs) => timestamp_cmp(value, rhs, Ordering::Equal),
        Comparator::TimestampEqualsPath(path) => {
            timestamp_cmp_path(value, path, document, Ordering::Equal)
        }
        Comparator::TimestampLessThan(rhs) => timestamp_lt(value, rhs),
        Comparator::TimestampLessThanPath(path) => {
            timestamp_cmp_path(value, path, document, Ordering::Less)
        }
        Comparator::TimestampGreaterThan(rhs) => timestamp_gt(value, rhs),
        Comparator::TimestampGreaterThanPath(path) => {
            timestamp_cmp_path(value, path, document, Ordering::Greater)
        }
        Comparator::TimestampLessThanEquals(rhs) => {
            timestamp_lt(value, rhs) || timestamp_cmp(value, rhs, Ordering::Equal)
        }
        Comparator::TimestampLessThanEqualsPath(path) => {
            timestamp_cmp_path(value, path, document, Ordering::Less)
                || timestamp_cmp_path(value, path, document, Ordering::Equal)
        }
        Comparator::TimestampGreaterThanEquals(rhs) => {
            timestamp_gt(value, rhs) || timestamp_cmp(value, rhs, Ordering::Equal)
        }
        Comparator::TimestampGreaterThanEqualsPath(path) => {
            timestamp_cmp_path(value, path, document, Ordering::Greater)
                || timestamp_cmp_path(value, path, document, Ordering::Equal)
        }

        Comparator::IsNull(_)
        | Comparator::IsPresent(_)
        | Comparator::IsNumeric(_)
        | Comparator::IsString(_)
        | Comparator::IsBoolean(_)
        | Comparator::IsTimestamp(_) => unreachable!("handled in evaluate_comparator"),
    }
}

fn resolve_string<'a>(path: &str, document: &'a Value) -> Option<&'a str> {
    RefPath::parse(path).ok().and_then(|p| p.resolve(document))?.as_str()
}

fn numeric_cmp(value: &Value, path: &str, document: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    let rhs = RefPath::parse(path)
        .ok()
        .and_then(|p| p.resolve(document))
        .and_then(Value::as_f64);
    value
        .as_f64()
        .zip(rhs)
        .is_some_and(|(l, r)| op(l, r))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn timestamp_cmp(value: &Value, rhs: &str, ord: std::cmp::Ordering) -> bool {
    let lhs = value.as_str().and_then(parse_timestamp);
    let rhs = parse_timestamp(rhs);
    lhs.zip(rhs).is_some_and(|(l, r)| l.cmp(&r) == ord)
}

fn timestamp_lt(value: &Value, rhs: &str) -> bool {
    let lhs = value.as_str().and_then(parse_timestamp);
    let rhs = parse_timestamp(rhs);
    lhs.zip(rhs).is_some_and(|(l, r)| l < r)
}

fn timestamp_gt(value: &Value, rhs: &str) -> bool {
    let lhs = value.as_str().and_then(parse_timestamp);
    let rhs = parse_timestamp(rhs);
    lhs.zip(rhs).is_some_and(|(l, r)| l > r)
}

fn timestamp_cmp_path(
    value: &Value,
    path: &str,
    document: &Value,
    ord: std::cmp::Ordering,
) -> bool {
    let rhs = RefPath::parse(path)
        .ok()
        .and_then(|p| p.resolve(document))
        .and_then(Value::as_str);
    match rhs {
        Some(rhs) => timestamp_cmp(value, rhs, ord),
        None => false,
    }
}

/// Anchored glob match: `*` consumes any run of characters, `\*`
/// matches a literal asterisk. No other metacharacters are special.
fn glob_matches(pattern: &str, text: &str) -> bool {
    let tokens = tokenize_glob(pattern);
    glob_match_tokens(&tokens, text.as_bytes())
}

enum GlobToken {
    Literal(char),
    Star,
}

fn tokenize_glob(pattern: &str) -> Vec<GlobToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'*') {
            tokens.push(GlobToken::Literal('*'));
            chars.next();
        } else if c == '*' {
            tokens.push(GlobToken::Star);
        } else {
            tokens.push(GlobToken::Literal(c));
        }
    }
    tokens
}

fn glob_match_tokens(tokens: &[GlobToken], text: &[u8]) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((GlobToken::Star, rest)) => {
            (0..=text.len()).any(|i| glob_match_tokens(rest, &text[i..]))
        }
        Some((GlobToken::Literal(c), rest)) => {
            let mut buf = [0u8; 4];
            let encoded = c.encode_utf8(&mut buf).as_bytes();
            text.starts_with(encoded) && glob_match_tokens(rest, &text[encoded.len()..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::RawMachine;
    use crate::filters::PathSpec;
    use serde_json::json;

    fn compiled_choices(json_choices: Value, default: Option<&str>) -> (Vec<ChoiceRule>, CompiledState) {
        let def = json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": json_choices,
                    "Default": default,
                },
                "Big": {"Type": "Succeed"},
                "Small": {"Type": "Succeed"},
            }
        });
        let raw: RawMachine = serde_json::from_value(def).unwrap();
        let raw_state = raw.states["C"].clone();
        let choices = match &raw_state.kind {
            crate::definition::StateKind::Choice { choices, .. } => choices.clone(),
            _ => unreachable!(),
        };
        let state = CompiledState {
            comment: None,
            next: None,
            end: None,
            input_path: PathSpec::Default,
            output_path: PathSpec::Default,
            parameters: None,
            result_path: PathSpec::Default,
            result_selector: None,
            retry: vec![],
            catch: vec![],
            kind: crate::machine::CompiledKind::Succeed,
        };
        (choices, state)
    }

    #[tokio::test]
    async fn routes_on_numeric_greater_than() {
        let (choices, state) = compiled_choices(
            json!([{"Variable": "$.n", "NumericGreaterThan": 5.0, "Next": "Big"}]),
            Some("Small"),
        );
        let input = json!({"n": 7});
        let (_, next) = run(&input, &state, &choices, Some("Small"), &DefaultRetry::default())
            .await
            .unwrap();
        assert_eq!(next, Next::Named("Big".into()));
    }

    #[tokio::test]
    async fn falls_through_to_default() {
        let (choices, state) = compiled_choices(
            json!([{"Variable": "$.n", "NumericGreaterThan": 5.0, "Next": "Big"}]),
            Some("Small"),
        );
        let input = json!({"n": 1});
        let (_, next) = run(&input, &state, &choices, Some("Small"), &DefaultRetry::default())
            .await
            .unwrap();
        assert_eq!(next, Next::Named("Small".into()));
    }

    #[tokio::test]
    async fn no_match_no_default_fails_with_no_choice_matched() {
        let (choices, state) = compiled_choices(
            json!([{"Variable": "$.n", "NumericGreaterThan": 5.0, "Next": "Big"}]),
            None,
        );
        let input = json!({"n": 1});
        let err = run(&input, &state, &choices, None, &DefaultRetry::default())
            .await
            .unwrap_err();
        assert_eq!(err.error, names::NO_CHOICE_MATCHED);
    }

    #[test]
    fn missing_variable_is_false_not_error() {
        let comparator = Comparator::NumericGreaterThan(5.0);
        assert!(!evaluate_comparator("$.missing", &comparator, &json!({})));
    }

    #[test]
    fn glob_star_matches_any_run() {
        assert!(glob_matches("foo*baz", "foobarbaz"));
        assert!(!glob_matches("foo*baz", "foobar"));
        assert!(glob_matches(r"literal\*star", "literal*star"));
    }

    #[test]
    fn and_or_not_combinators() {
        let doc = json!({"n": 7, "flag": true});
        let rule = ChoiceRule {
            next: Some("X".into()),
            test: ChoiceTest::And {
                and: vec![
                    ChoiceRule {
                        next: None,
                        test: ChoiceTest::Comparator {
                            variable: "$.n".into(),
                            comparator: Comparator::NumericGreaterThan(5.0),
                        },
                    },
                    ChoiceRule {
                        next: None,
                        test: ChoiceTest::Not {
                            not: Box::new(ChoiceRule {
                                next: None,
                                test: ChoiceTest::Comparator {
                                    variable: "$.flag".into(),
                                    comparator: Comparator::BooleanEquals(false),
                                },
                            }),
                        },
                    },
                ],
            },
        };
        assert!(evaluate_rule(&rule, &doc));
    }
}
