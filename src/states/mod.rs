//! The seven ASL state-kind handlers, behind a shared retry/catch loop.
//!
//! Grounded on `node.rs`'s `Node` trait shape — one async unit of work
//! per kind — generalized here from "agent step" to "ASL state kind".
//! Because each kind's attribute set and filter subset differ (spec
//! §4.3-4.9), the seven kinds are free functions rather than one trait
//! impl; [`run_with_retry`] is the one piece of behavior shared by all
//! of them (spec §4.4, applied uniformly since `Retry`/`Catch` are
//! common per-state fields per spec §6).

pub mod choice;
pub mod fail;
pub mod parallel;
pub mod pass;
pub mod succeed;
pub mod task;
pub mod wait;

use std::future::Future;

use serde_json::Value;

use crate::context::DefaultRetry;
use crate::error::ErrorRecord;
use crate::machine::CompiledState;
use crate::retry::{Action, CatcherSpec, RetrierSpec, RetryTracker};

/// Where a state transitions to once its work step (and any retry/catch
/// recovery) has produced an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Named(String),
    End,
}

/// Resolve the `Next`/`End` transition for a state that carries them
/// directly (Pass, Task, Wait, Parallel). Choice resolves its own
/// transition from its matched rule instead.
pub fn next_of(state: &CompiledState) -> Next {
    match &state.next {
        Some(name) => Next::Named(name.clone()),
        None => Next::End,
    }
}

/// The outcome of a Succeed/Fail state: these end the whole execution
/// rather than transitioning to another state.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Succeeded(Value),
    Failed(ErrorRecord),
}

/// Run `body` (a state's full filter-pipeline-plus-work-step closure),
/// applying `retry`/`catch` around it per spec §4.4: on an error, find
/// the first matching retrier and sleep the backoff delay, re-running
/// `body`; once retries are exhausted, find the first matching catcher
/// and redirect there with the error payload injected; if neither
/// matches, the error propagates and the whole execution fails.
pub async fn run_with_retry<F, Fut>(
    raw_input_at_entry: &Value,
    retry: &[RetrierSpec],
    catch: &[CatcherSpec],
    defaults: &DefaultRetry,
    mut body: F,
) -> Result<(Value, Next), ErrorRecord>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(Value, Next), ErrorRecord>>,
{
    let mut tracker = RetryTracker::new(retry);
    loop {
        match body().await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => match tracker.next_action(retry, catch, &err, defaults) {
                Action::Retry { delay } => {
                    tokio::time::sleep(delay).await;
                }
                Action::Catch { catcher_index } => {
                    let catcher = &catch[catcher_index];
                    let payload = serde_json::json!({
                        "Error": err.error,
                        "Cause": err.cause,
                    });
                    let combined = crate::filters::apply_result_path(
                        raw_input_at_entry,
                        payload,
                        &catcher.result_path,
                    )?;
                    return Ok((combined, Next::Named(catcher.next.clone())));
                }
                Action::Fail => return Err(err),
            },
        }
    }
}
