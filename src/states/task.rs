//! Task state (spec §4.4): invokes the host-supplied [`TaskExecutor`]
//! against an opaque `resource` URI the engine never interprets.
//! `TimeoutSeconds` is enforced here with `tokio::time::timeout`;
//! `HeartbeatSeconds` is carried for round-tripping only, per spec's
//! note that heartbeat enforcement is a host concern.

use std::time::Duration;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ErrorRecord;
use crate::filters::{
    apply_input_path, apply_output_path, apply_parameters, apply_result_path,
    apply_result_selector,
};
use crate::machine::CompiledState;
use crate::states::{next_of, run_with_retry, Next};

pub struct TaskAttrs<'a> {
    pub resource: &'a str,
    pub timeout_seconds: Option<u64>,
}

pub async fn run(
    raw_input: &Value,
    state: &CompiledState,
    attrs: &TaskAttrs<'_>,
    ctx: &ExecutionContext,
) -> Result<(Value, Next), ErrorRecord> {
    run_with_retry(raw_input, &state.retry, &state.catch, &ctx.config.default_retry, || async {
        let filtered = apply_input_path(raw_input, &state.input_path)?;
        let effective =
            apply_parameters(&filtered, state.parameters.as_ref(), ctx.config.rng.as_ref())?;
        let raw_result = invoke(attrs.resource, effective, ctx, attrs.timeout_seconds).await?;
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

async fn invoke(
    resource: &str,
    input: Value,
    ctx: &ExecutionContext,
    timeout_seconds: Option<u64>,
) -> Result<Value, ErrorRecord> {
    let call = ctx.task_executor.invoke(resource, input, ctx.credentials.as_ref());

    let result = match timeout_seconds {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(inner) => inner,
            Err(_) => return Err(ErrorRecord::timeout()),
        },
        None => call.await,
    };

    result.map_err(|e| e.into_record())
}
