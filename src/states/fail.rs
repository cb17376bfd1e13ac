//! Fail state (spec §4.9): terminal. Emits `{Error, Cause}` from its own
//! literal fields and ends the execution as failed. No filters apply.

use crate::error::ErrorRecord;
use crate::states::TerminalOutcome;

pub fn run(error: Option<&str>, cause: Option<&str>) -> TerminalOutcome {
    let record = ErrorRecord::new(
        error.unwrap_or("States.TaskFailed").to_string(),
        cause.map(str::to_string),
    );
    TerminalOutcome::Failed(record)
}
