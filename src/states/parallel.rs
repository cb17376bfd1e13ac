//! Parallel state (spec §4.7): runs each branch as a full recursive
//! sub-[`Machine`](crate::machine::Machine), bounded by `MaxConcurrency`,
//! merging their outputs into a positionally-aligned array. Actual
//! scheduling lives in [`crate::parallel_runner`]; this module is just
//! the filter pipeline around it.

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ErrorRecord;
use crate::filters::{
    apply_input_path, apply_output_path, apply_parameters, apply_result_path,
    apply_result_selector,
};
use crate::machine::{CompiledState, Machine};
use crate::parallel_runner;
use crate::states::{next_of, run_with_retry, Next};

pub async fn run(
    raw_input: &Value,
    state: &CompiledState,
    branches: &[Machine],
    max_concurrency: usize,
    ctx: &ExecutionContext,
) -> Result<(Value, Next), ErrorRecord> {
    run_with_retry(raw_input, &state.retry, &state.catch, &ctx.config.default_retry, || async {
        let filtered = apply_input_path(raw_input, &state.input_path)?;
        let effective =
            apply_parameters(&filtered, state.parameters.as_ref(), ctx.config.rng.as_ref())?;
        let raw_result =
            parallel_runner::run_branches(branches, &effective, max_concurrency, ctx).await?;
        let selected = apply_result_selector(
            &raw_result,
            state.result_selector.as_ref(),
            ctx.config.rng.as_ref(),
        )?;
        let combined = apply_result_path(raw_input, selected, &state.result_path)?;
        let output = apply_output_path(&combined, &state.output_path)?;
        Ok((output, next_of(state)))
    })
    .await
}
