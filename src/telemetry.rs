//! Rendering and tracing for execution history (spec §4.12's history
//! trail). [`Execution::step`](crate::execution::Execution::step) emits
//! a `tracing` span per transition; [`PlainFormatter`] renders a
//! finished [`Execution`](crate::execution::Execution)'s history and
//! terminal error for human-readable output, keeping the same split
//! between live `tracing` instrumentation and a `TelemetryFormatter`
//! trait for presenting finished event logs.

use crate::error::{ErrorRecord, HistoryEntry};

pub const ERROR_COLOR: &str = "\x1b[31m"; // red
pub const STATE_COLOR: &str = "\x1b[36m"; // cyan
pub const RESET_COLOR: &str = "\x1b[0m";

/// Rendered output for one history entry or terminal error.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_history(&self, history: &[HistoryEntry]) -> Vec<EventRender>;
    fn render_error(&self, error: &ErrorRecord) -> EventRender;
}

pub struct PlainFormatter;

impl TelemetryFormatter for PlainFormatter {
    fn render_history(&self, history: &[HistoryEntry]) -> Vec<EventRender> {
        history
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let elapsed = entry.exited_at - entry.entered_at;
                let line = format!(
                    "{STATE_COLOR}[{i}] {}{RESET_COLOR} ({}ms) -> {}\n",
                    entry.state_name,
                    elapsed.num_milliseconds(),
                    entry.output_snapshot
                );
                EventRender {
                    context: Some(entry.state_name.clone()),
                    lines: vec![line],
                }
            })
            .collect()
    }

    fn render_error(&self, error: &ErrorRecord) -> EventRender {
        let mut lines = vec![format!("{ERROR_COLOR}error: {}{RESET_COLOR}\n", error.error)];
        if let Some(cause) = &error.cause {
            lines.push(format!("{ERROR_COLOR}  cause: {cause}{RESET_COLOR}\n"));
        }
        EventRender {
            context: Some(error.error.clone()),
            lines,
        }
    }
}

/// A `tracing` span for one state transition, scoped to the owning
/// execution. [`crate::execution::Execution::step`] attaches this to its
/// dispatch future with [`tracing::Instrument::instrument`] rather than
/// holding an `Entered` guard across `.await` points, so the future stays
/// `Send` (required for branches spawned by
/// [`crate::parallel_runner`](crate::parallel_runner)) while still
/// attributing any events a `TaskExecutor` emits to the right state.
pub fn transition_span(execution_name: &str, state_name: &str) -> tracing::Span {
    tracing::info_span!("asl_transition", execution = execution_name, state = state_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn renders_one_line_per_history_entry() {
        let now = Utc::now();
        let history = vec![HistoryEntry {
            state_name: "A".into(),
            entered_at: now,
            exited_at: now,
            output_snapshot: json!({"x": 1}),
        }];
        let rendered = PlainFormatter.render_history(&history);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].join_lines().contains('A'));
    }

    #[test]
    fn renders_error_with_cause() {
        let error = ErrorRecord::new("States.TaskFailed", Some("boom".into()));
        let rendered = PlainFormatter.render_error(&error);
        assert!(rendered.join_lines().contains("boom"));
    }
}
