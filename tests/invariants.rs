//! Property tests for the dispatcher-level invariants spec §8 calls out
//! by name: the identity filter law for a bare Pass, the `ResultPath`/
//! `OutputPath` null special cases, and monotonic history ordering
//! across an arbitrary-length chain.
//!
//! Grounded on the teacher's `tests/graphs_property.rs` — a `proptest!`
//! suite driving a compiled graph through a `block_on` helper rather
//! than `#[tokio::test]`, since `proptest!`'s generated `fn` bodies
//! aren't `async`.

#[macro_use]
extern crate proptest;

use std::sync::Arc;

use async_trait::async_trait;
use asl_interpreter::{build_machine, ExecutionContext, TaskError, TaskExecutor};
use proptest::prelude::*;
use serde_json::{json, Value};

struct Echo;

#[async_trait]
impl TaskExecutor for Echo {
    async fn invoke(
        &self,
        _resource: &str,
        input: Value,
        _credentials: Option<&Value>,
    ) -> Result<Value, TaskError> {
        Ok(input)
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(fut)
}

fn json_field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ]
}

proptest! {
    /// A Pass state with no `Parameters`/`Result` and default paths is
    /// the identity filter: its output equals its input, for any JSON
    /// object input (spec §8 "identity filter law").
    #[test]
    fn prop_bare_pass_is_identity(n in any::<i64>(), flag in any::<bool>(), s in ".*") {
        let input = json!({"n": n, "flag": flag, "s": s});
        let def = json!({
            "StartAt": "A",
            "States": {"A": {"Type": "Pass", "End": true}}
        });
        let machine = build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let output = block_on(async {
            let mut execution = machine.start_execution(input.clone(), "prop-pass", ctx);
            execution.run_all().await;
            execution.output().clone()
        });
        prop_assert_eq!(output, input);
    }

    /// `ResultPath: null` discards the work step's result entirely: the
    /// state's output (modulo `OutputPath`, here left default) equals
    /// the raw input at pipeline entry.
    #[test]
    fn prop_result_path_null_discards_result(n in any::<i64>(), result_value in json_field_value_strategy()) {
        let input = json!({"n": n});
        let def = json!({
            "StartAt": "A",
            "States": {
                "A": {
                    "Type": "Pass",
                    "Result": result_value,
                    "ResultPath": null,
                    "End": true
                }
            }
        });
        let machine = build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let output = block_on(async {
            let mut execution = machine.start_execution(input.clone(), "prop-resultpath-null", ctx);
            execution.run_all().await;
            execution.output().clone()
        });
        prop_assert_eq!(output, input);
    }

    /// `OutputPath: null` always yields `{}`, regardless of what the
    /// combined document looked like.
    #[test]
    fn prop_output_path_null_yields_empty_object(n in any::<i64>()) {
        let input = json!({"n": n});
        let def = json!({
            "StartAt": "A",
            "States": {"A": {"Type": "Pass", "OutputPath": null, "End": true}}
        });
        let machine = build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let output = block_on(async {
            let mut execution = machine.start_execution(input, "prop-outputpath-null", ctx);
            execution.run_all().await;
            execution.output().clone()
        });
        prop_assert_eq!(output, json!({}));
    }

    /// Driving an arbitrary-length chain of Pass states to completion
    /// produces a history whose `exited_at` timestamps are monotonically
    /// non-decreasing, and whose length equals the number of states
    /// visited (spec §8: history entries ordered by `exited_at`).
    #[test]
    fn prop_history_is_monotonically_ordered(chain_len in 1usize..12) {
        let mut states = serde_json::Map::new();
        for i in 0..chain_len {
            let name = format!("S{i}");
            let spec = if i + 1 < chain_len {
                json!({"Type": "Pass", "Next": format!("S{}", i + 1)})
            } else {
                json!({"Type": "Pass", "End": true})
            };
            states.insert(name, spec);
        }
        let def = json!({"StartAt": "S0", "States": Value::Object(states)});
        let machine = build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));

        let history = block_on(async {
            let mut execution = machine.start_execution(json!({}), "prop-history", ctx);
            execution.run_all().await;
            prop_assert!(execution.status().is_succeeded());
            Ok::<_, proptest::test_runner::TestCaseError>(execution.history().to_vec())
        })?;

        prop_assert_eq!(history.len(), chain_len);
        for pair in history.windows(2) {
            prop_assert!(pair[0].exited_at <= pair[1].exited_at);
        }
    }

    /// A Choice rule whose comparator matches the resolved left-hand
    /// value routes to that rule's `Next`, and the state's output
    /// (InputPath/OutputPath both default) equals its input, since
    /// Choice never touches the document itself.
    #[test]
    fn prop_matching_choice_output_equals_input(n in any::<i64>()) {
        let input = json!({"n": n});
        let def = json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.n", "NumericEquals": n as f64, "Next": "Matched"}],
                    "Default": "Unmatched"
                },
                "Matched": {"Type": "Succeed"},
                "Unmatched": {"Type": "Fail", "Error": "ShouldNotHappen"}
            }
        });
        let machine = build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let output = block_on(async {
            let mut execution = machine.start_execution(input.clone(), "prop-choice", ctx);
            execution.run_all().await;
            prop_assert!(execution.status().is_succeeded());
            Ok::<_, proptest::test_runner::TestCaseError>(execution.output().clone())
        })?;
        prop_assert_eq!(output, input);
    }
}
