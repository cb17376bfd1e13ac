//! Bounded-concurrency branch runner for the Parallel state (spec
//! §4.7, §5). Each branch is a full recursive sub-[`Machine`], driven
//! to completion by its own [`Execution`]; branches run concurrently up
//! to `MaxConcurrency`, queued FIFO beyond that, and their final
//! outputs are collected into an array positionally aligned with
//! branch-declaration order regardless of completion order.
//!
//! Grounded on the Design Notes' explicit license ("a thread pool, a
//! bounded semaphore + tasks, or an async runtime"), built on this
//! workspace's `tokio` feature set (`rt-multi-thread`, `sync`, `time`).
//! On any branch's unrecovered failure, the remaining branches are
//! signalled via a shared `watch` channel and the state fails with
//! `States.BranchFailed` (spec §4.7) once every branch has wound down —
//! no branch output is merged after cancellation.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::context::ExecutionContext;
use crate::error::{names, ErrorRecord};
use crate::machine::Machine;

pub async fn run_branches(
    branches: &[Machine],
    input: &Value,
    max_concurrency: usize,
    ctx: &ExecutionContext,
) -> Result<Value, ErrorRecord> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let mut tasks = JoinSet::new();
    for (index, branch) in branches.iter().cloned().enumerate() {
        let input = input.clone();
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        let cancel_rx = cancel_rx.clone();

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed while branches are running");
            let name = format!("branch-{index}");
            let mut execution = branch.start_execution_with_cancel(input, name, ctx, Some(cancel_rx));
            execution.run_all().await;
            (index, execution)
        });
    }

    let mut outputs: Vec<Option<Value>> = vec![None; branches.len()];
    let mut first_failure: Option<ErrorRecord> = None;

    while let Some(joined) = tasks.join_next().await {
        let (index, execution) = joined.expect("branch task panicked");
        match execution.into_result() {
            Ok(output) => outputs[index] = Some(output),
            Err(error) => {
                if first_failure.is_none() {
                    first_failure = Some(error);
                    let _ = cancel_tx.send(true);
                }
            }
        }
    }

    match first_failure {
        Some(error) => Err(ErrorRecord::new(
            names::BRANCH_FAILED,
            Some(error.to_string()),
        )),
        None => Ok(Value::Array(
            outputs
                .into_iter()
                .map(|o| o.unwrap_or(Value::Null))
                .collect(),
        )),
    }
}
