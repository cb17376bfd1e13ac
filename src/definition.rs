//! The externally parsed definition tree (spec §6): a tagged-variant
//! sum type over the seven ASL state kinds, deserialized straight from
//! `serde_json::Value` (or anything else implementing `serde::Deserialize`,
//! per §1's definition-loader non-goal — callers own parsing YAML/JSON
//! text into this tree or a `Value`).
//!
//! Grounded on `types.rs`'s tagged-enum style (externally tagged
//! `NodeKind`/`ChannelType` variants deserializing straight off the
//! wire) and `graphs/builder.rs`'s attribute grouping per node kind.

use serde::Deserialize;

use crate::filters::PathSpec;
use crate::retry::{CatcherSpec, RetrierSpec};

/// The raw machine definition, as accepted by [`crate::build_machine`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMachine {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub start_at: String,
    pub states: std::collections::BTreeMap<String, RawState>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Fields common to every state kind, flattened alongside the
/// kind-specific attributes carried by [`StateKind`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawState {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub end: Option<bool>,
    #[serde(default)]
    pub input_path: PathSpec,
    #[serde(default)]
    pub output_path: PathSpec,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub result_path: PathSpec,
    #[serde(default)]
    pub result_selector: Option<serde_json::Value>,
    #[serde(default)]
    pub retry: Vec<RetrierSpec>,
    #[serde(default)]
    pub catch: Vec<CatcherSpec>,

    #[serde(flatten)]
    pub kind: StateKind,
}

impl RawState {
    /// Whether this state has exactly one of `Next` / `End: true` — the
    /// invariant every non-Choice, non-terminal state must satisfy.
    pub fn has_single_transition(&self) -> bool {
        self.next.is_some() != matches!(self.end, Some(true))
    }
}

/// Kind-specific attributes, tagged by the JSON `Type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum StateKind {
    Pass {
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    Task {
        resource: String,
        #[serde(default)]
        timeout_seconds: Option<u64>,
        #[serde(default)]
        heartbeat_seconds: Option<u64>,
    },
    Choice {
        choices: Vec<ChoiceRule>,
        #[serde(default)]
        default: Option<String>,
    },
    Wait {
        #[serde(default)]
        seconds: Option<i64>,
        #[serde(default)]
        seconds_path: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        timestamp_path: Option<String>,
    },
    Parallel {
        branches: Vec<RawMachine>,
        #[serde(default)]
        max_concurrency: Option<i64>,
    },
    Succeed,
    Fail {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        cause: Option<String>,
    },
}

/// One entry of a Choice state's `Choices` array: either a leaf
/// comparator test against a resolved `Variable`, or a boolean
/// combinator over nested rules.
///
/// `Next` is only meaningful (and only required) on top-level entries
/// of `Choices[]`; nested rules under `And`/`Or`/`Not` omit it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceRule {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(flatten)]
    pub test: ChoiceTest,
}

/// The leaf/combinator test shape of a [`ChoiceRule`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChoiceTest {
    And {
        #[serde(rename = "And")]
        and: Vec<ChoiceRule>,
    },
    Or {
        #[serde(rename = "Or")]
        or: Vec<ChoiceRule>,
    },
    Not {
        #[serde(rename = "Not")]
        not: Box<ChoiceRule>,
    },
    Comparator {
        #[serde(rename = "Variable")]
        variable: String,
        #[serde(flatten)]
        comparator: Comparator,
    },
}

/// A single comparator attached to a Choice rule's resolved `Variable`.
///
/// Each variant's field name is the literal ASL key (`StringEquals`,
/// `NumericGreaterThanPath`, …); the `*Path` forms resolve their
/// right-hand side as a reference path instead of taking it as a
/// literal.
#[derive(Debug, Clone, Deserialize)]
pub enum Comparator {
    StringEquals(String),
    StringEqualsPath(String),
    StringLessThan(String),
    StringLessThanPath(String),
    StringGreaterThan(String),
    StringGreaterThanPath(String),
    StringLessThanEquals(String),
    StringLessThanEqualsPath(String),
    StringGreaterThanEquals(String),
    StringGreaterThanEqualsPath(String),
    StringMatches(String),

    NumericEquals(f64),
    NumericEqualsPath(String),
    NumericLessThan(f64),
    NumericLessThanPath(String),
    NumericGreaterThan(f64),
    NumericGreaterThanPath(String),
    NumericLessThanEquals(f64),
    NumericLessThanEqualsPath(String),
    NumericGreaterThanEquals(f64),
    NumericGreaterThanEqualsPath(String),

    BooleanEquals(bool),
    BooleanEqualsPath(String),

    TimestampEquals(String),
    TimestampEqualsPath(String),
    TimestampLessThan(String),
    TimestampLessThanPath(String),
    TimestampGreaterThan(String),
    TimestampGreaterThanPath(String),
    TimestampLessThanEquals(String),
    TimestampLessThanEqualsPath(String),
    TimestampGreaterThanEquals(String),
    TimestampGreaterThanEqualsPath(String),

    IsNull(bool),
    IsPresent(bool),
    IsNumeric(bool),
    IsString(bool),
    IsBoolean(bool),
    IsTimestamp(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pass_state() {
        let json = serde_json::json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "End": true, "Result": {"x": 1}}
            }
        });
        let machine: RawMachine = serde_json::from_value(json).unwrap();
        let a = &machine.states["A"];
        assert!(matches!(a.kind, StateKind::Pass { result: Some(_) }));
        assert!(a.has_single_transition());
    }

    #[test]
    fn parses_choice_with_nested_combinators() {
        let json = serde_json::json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {
                            "Next": "Big",
                            "And": [
                                {"Variable": "$.n", "NumericGreaterThan": 5.0},
                                {"Variable": "$.flag", "BooleanEquals": true}
                            ]
                        }
                    ],
                    "Default": "Small"
                }
            }
        });
        let machine: RawMachine = serde_json::from_value(json).unwrap();
        let c = &machine.states["C"];
        match &c.kind {
            StateKind::Choice { choices, default } => {
                assert_eq!(default.as_deref(), Some("Small"));
                assert_eq!(choices[0].next.as_deref(), Some("Big"));
                assert!(matches!(choices[0].test, ChoiceTest::And { .. }));
            }
            other => panic!("expected Choice, got {other:?}"),
        }
    }

    #[test]
    fn missing_both_next_and_end_is_not_a_single_transition() {
        let json = serde_json::json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass"}
            }
        });
        let machine: RawMachine = serde_json::from_value(json).unwrap();
        assert!(!machine.states["A"].has_single_transition());
    }

    #[test]
    fn parallel_state_parses_nested_branches() {
        let json = serde_json::json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "End": true,
                    "Branches": [
                        {"StartAt": "B1", "States": {"B1": {"Type": "Succeed"}}}
                    ]
                }
            }
        });
        let machine: RawMachine = serde_json::from_value(json).unwrap();
        match &machine.states["P"].kind {
            StateKind::Parallel { branches, .. } => assert_eq!(branches.len(), 1),
            other => panic!("expected Parallel, got {other:?}"),
        }
    }
}
