//! Succeed state (spec §4.8): terminal. Applies `InputPath` then
//! `OutputPath` only and ends the execution successfully with that
//! document.

use serde_json::Value;

use crate::error::ErrorRecord;
use crate::filters::{apply_input_path, apply_output_path, PathSpec};
use crate::states::TerminalOutcome;

pub fn run(
    raw_input: &Value,
    input_path: &PathSpec,
    output_path: &PathSpec,
) -> Result<TerminalOutcome, ErrorRecord> {
    let filtered = apply_input_path(raw_input, input_path)?;
    let output = apply_output_path(&filtered, output_path)?;
    Ok(TerminalOutcome::Succeeded(output))
}
