//! The dispatcher: drives a compiled [`Machine`] from its `StartAt`
//! state to a terminal outcome, one state transition at a time.
//!
//! Grounded on `schedulers/mod.rs`'s step-until-terminal drive of a
//! compiled graph, generalized from "run each ready node" to "run the
//! current ASL state, then follow its `Next`".
//! [`Execution::run_all`] is the step loop; [`Execution::step`]
//! is the single-transition primitive, exposed so host applications can
//! drive an execution one state at a time (e.g. to checkpoint between
//! steps, per spec §4.12's durability note).

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::Instrument;

use crate::context::ExecutionContext;
use crate::error::{ErrorRecord, HistoryEntry};
use crate::machine::{CompiledKind, Machine};
use crate::states::{choice, fail, parallel, pass, succeed, task, wait, Next, TerminalOutcome};

/// An execution's lifecycle state (spec §4.10/§4.12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Running,
    Succeeded,
    Failed,
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Status::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed)
    }
}

/// A single run of a [`Machine`] against one input document.
pub struct Execution {
    machine: Machine,
    ctx: ExecutionContext,
    name: String,
    status: Status,
    current_state: Option<String>,
    document: Value,
    error: Option<ErrorRecord>,
    history: Vec<HistoryEntry>,
    cancel: Option<watch::Receiver<bool>>,
    started_at: chrono::DateTime<Utc>,
}

impl Machine {
    /// Start a top-level execution: no cancellation source, since only
    /// Parallel branches (spec §5) can be aborted from the outside.
    pub fn start_execution(
        &self,
        input: Value,
        name: impl Into<String>,
        ctx: ExecutionContext,
    ) -> Execution {
        self.start_execution_with_cancel(input, name, ctx, None)
    }

    /// Start an execution carrying an optional cancellation receiver,
    /// used by [`crate::parallel_runner`] to start Parallel branches
    /// that can be aborted when a sibling branch fails.
    pub fn start_execution_with_cancel(
        &self,
        input: Value,
        name: impl Into<String>,
        ctx: ExecutionContext,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Execution {
        Execution {
            machine: self.clone(),
            ctx,
            name: name.into(),
            status: Status::Running,
            current_state: Some(self.start_at.clone()),
            document: input,
            error: None,
            history: Vec::new(),
            cancel,
            started_at: Utc::now(),
        }
    }
}

impl Execution {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The current working document: the input while running, the
    /// final output once succeeded.
    pub fn output(&self) -> &Value {
        &self.document
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Wall-clock time since this execution started. Measured against
    /// the last history entry's `exited_at` once terminal, or the
    /// current time while still running, so it keeps advancing across
    /// repeated `step()` calls rather than freezing at construction.
    pub fn execution_time(&self) -> chrono::Duration {
        let now = match self.history.last() {
            Some(entry) if !self.status.is_running() => entry.exited_at,
            _ => Utc::now(),
        };
        now - self.started_at
    }

    /// Drive the execution to a terminal status, respecting
    /// `EngineConfig::max_steps` (spec §4.10 step-budget safeguard).
    pub async fn run_all(&mut self) {
        loop {
            if !self.status.is_running() {
                return;
            }
            if let Some(max) = self.ctx.config.max_steps {
                if self.history.len() as u64 >= max {
                    self.status = Status::Failed;
                    self.error = Some(ErrorRecord::new(
                        crate::error::names::RUNTIME,
                        Some(format!("execution exceeded max_steps ({max})")),
                    ));
                    return;
                }
            }
            self.step().await;
        }
    }

    /// Run exactly one state-transition step. A no-op once the
    /// execution has reached a terminal status.
    pub async fn step(&mut self) {
        if !self.status.is_running() {
            return;
        }
        let name = self
            .current_state
            .clone()
            .expect("a running execution always has a current state");
        let Some(state) = self.machine.states.get(&name).cloned() else {
            self.fail_with(ErrorRecord::new(
                crate::error::names::RUNTIME,
                Some(format!("state '{name}' missing from compiled machine")),
            ));
            return;
        };

        let entered_at = Utc::now();
        let input = self.document.clone();
        let span = crate::telemetry::transition_span(&self.name, &name);
        tracing::debug!(parent: &span, "entering state");

        match &state.kind {
            CompiledKind::Succeed => {
                match succeed::run(&input, &state.input_path, &state.output_path) {
                    Ok(TerminalOutcome::Succeeded(output)) => {
                        self.push_history(&name, entered_at, output.clone());
                        self.document = output;
                        self.status = Status::Succeeded;
                    }
                    Ok(TerminalOutcome::Failed(_)) => {
                        unreachable!("succeed::run never returns Failed")
                    }
                    Err(err) => self.fail_with(err),
                }
                return;
            }
            CompiledKind::Fail { error, cause } => {
                match fail::run(error.as_deref(), cause.as_deref()) {
                    TerminalOutcome::Failed(err) => {
                        self.push_history(&name, entered_at, input);
                        self.fail_with(err);
                    }
                    TerminalOutcome::Succeeded(_) => {
                        unreachable!("fail::run never returns Succeeded")
                    }
                }
                return;
            }
            _ => {}
        }

        let result = async {
            match &state.kind {
                CompiledKind::Pass { result } => {
                    pass::run(
                        &input,
                        &state,
                        result.as_ref(),
                        self.ctx.config.rng.as_ref(),
                        &self.ctx.config.default_retry,
                    )
                    .await
                }
                CompiledKind::Task {
                    resource,
                    timeout_seconds,
                    ..
                } => {
                    let attrs = task::TaskAttrs {
                        resource,
                        timeout_seconds: *timeout_seconds,
                    };
                    task::run(&input, &state, &attrs, &self.ctx).await
                }
                CompiledKind::Choice { choices, default } => {
                    choice::run(
                        &input,
                        &state,
                        choices,
                        default.as_deref(),
                        &self.ctx.config.default_retry,
                    )
                    .await
                }
                CompiledKind::Wait {
                    seconds,
                    seconds_path,
                    timestamp,
                    timestamp_path,
                } => {
                    let attrs = wait::WaitAttrs {
                        seconds: *seconds,
                        seconds_path: seconds_path.as_deref(),
                        timestamp: timestamp.as_deref(),
                        timestamp_path: timestamp_path.as_deref(),
                    };
                    wait::run(
                        &input,
                        &state,
                        &attrs,
                        self.cancel.as_ref(),
                        &self.ctx.config.default_retry,
                    )
                    .await
                }
                CompiledKind::Parallel {
                    branches,
                    max_concurrency,
                } => parallel::run(&input, &state, branches, *max_concurrency, &self.ctx).await,
                CompiledKind::Succeed | CompiledKind::Fail { .. } => {
                    unreachable!("handled above")
                }
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok((output, next)) => {
                self.push_history(&name, entered_at, output.clone());
                self.document = output;
                match next {
                    Next::Named(target) => self.current_state = Some(target),
                    Next::End => self.status = Status::Succeeded,
                }
            }
            Err(err) => {
                self.push_history(&name, entered_at, input);
                self.fail_with(err);
            }
        }
    }

    /// Consume the execution, yielding its terminal output or error.
    /// Used by [`crate::parallel_runner`] to collect branch results.
    pub fn into_result(self) -> Result<Value, ErrorRecord> {
        match self.status {
            Status::Succeeded => Ok(self.document),
            Status::Failed => Err(self
                .error
                .unwrap_or_else(|| ErrorRecord::new(crate::error::names::RUNTIME, None))),
            Status::Running => Err(ErrorRecord::new(
                crate::error::names::RUNTIME,
                Some("execution did not reach a terminal state".into()),
            )),
        }
    }

    fn push_history(&mut self, state_name: &str, entered_at: chrono::DateTime<Utc>, output: Value) {
        self.history.push(HistoryEntry {
            state_name: state_name.to_string(),
            entered_at,
            exited_at: Utc::now(),
            output_snapshot: output,
        });
    }

    fn fail_with(&mut self, error: ErrorRecord) {
        self.status = Status::Failed;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EngineConfig, OsRng, TaskError, TaskExecutor};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn runs_a_pass_chain_to_success() {
        let def = json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Result": {"step": "a"}, "Next": "B"},
                "B": {"Type": "Pass", "Result": {"step": "b"}, "End": true}
            }
        });
        let machine = crate::machine::build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let mut execution = machine.start_execution(json!({}), "run-1", ctx);
        execution.run_all().await;
        assert!(execution.status().is_succeeded());
        assert_eq!(execution.output(), &json!({"step": "b"}));
        assert_eq!(execution.history().len(), 2);
    }

    #[tokio::test]
    async fn fail_state_surfaces_error() {
        let def = json!({
            "StartAt": "F",
            "States": {"F": {"Type": "Fail", "Error": "Boom", "Cause": "bad"}}
        });
        let machine = crate::machine::build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo));
        let mut execution = machine.start_execution(json!({}), "run-1", ctx);
        execution.run_all().await;
        assert!(execution.status().is_failed());
        assert_eq!(execution.error().unwrap().error, "Boom");
    }

    #[tokio::test]
    async fn max_steps_exceeded_fails_execution() {
        let def = json!({
            "StartAt": "Loop",
            "States": {
                "Loop": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.flag", "BooleanEquals": true, "Next": "Done"}],
                    "Default": "Loop"
                },
                "Done": {"Type": "Succeed"}
            }
        });
        let machine = crate::machine::build_machine(&def).unwrap();
        let ctx = ExecutionContext::new(Arc::new(Echo)).with_config(EngineConfig {
            max_steps: Some(3),
            default_retry: crate::context::DefaultRetry::default(),
            rng: Arc::new(OsRng),
        });
        let mut execution = machine.start_execution(json!({"flag": false}), "run-1", ctx);
        execution.run_all().await;
        assert!(execution.status().is_failed());
    }
}
