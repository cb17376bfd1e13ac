//! Pass state (spec §4.3): the identity state. Its work step is a
//! literal `Result`, or the effective input when `Result` is absent —
//! it never fails on its own, though the surrounding filter pipeline
//! (`InputPath`/`Parameters`/`ResultPath`/`OutputPath`) can.

use serde_json::Value;

use crate::context::{DefaultRetry, EngineRng};
use crate::error::ErrorRecord;
use crate::filters::{apply_input_path, apply_output_path, apply_parameters, apply_result_path};
use crate::machine::CompiledState;
use crate::states::{next_of, run_with_retry, Next};

pub async fn run(
    raw_input: &Value,
    state: &CompiledState,
    result: Option<&Value>,
    rng: &dyn EngineRng,
    defaults: &DefaultRetry,
) -> Result<(Value, Next), ErrorRecord> {
    run_with_retry(raw_input, &state.retry, &state.catch, defaults, || async {
        let filtered = apply_input_path(raw_input, &state.input_path)?;
        let effective = apply_parameters(&filtered, state.parameters.as_ref(), rng)?;
        let raw_result = match result {
            Some(literal) => literal.clone(),
            None => effective,
        };
        let combined = apply_result_path(raw_input, raw_result, &state.result_path)?;
        let output = apply_output_path(&combined, &state.output_path)?;
        Ok((output, next_of(state)))
    })
    .await
}
