//! # asl-interpreter: an Amazon States Language interpreter core
//!
//! A from-scratch interpreter for the Amazon States Language (ASL): the
//! declarative JSON dialect that describes a finite state machine whose
//! transitions are driven by data.
//!
//! ## Core concepts
//!
//! - **Machine**: a validated, immutable state machine compiled from a
//!   parsed definition tree by [`build_machine`]
//! - **State kinds**: `Pass`, `Task`, `Choice`, `Wait`, `Parallel`,
//!   `Succeed`, `Fail` — each its own module under [`states`]
//! - **Filter pipeline**: the six-stage `InputPath` -> `Parameters` ->
//!   work -> `ResultSelector` -> `ResultPath` -> `OutputPath` chain
//!   applied around every non-terminal state's work step
//! - **Execution**: one run of a [`Machine`] against an input document,
//!   driven by [`Execution::run_all`] or one step at a time by
//!   [`Execution::step`]
//!
//! This crate deliberately does not include a definition-text loader, a
//! Task resource executor, or execution persistence — those are host
//! concerns, consumed here as a parsed definition tree and a
//! [`TaskExecutor`] trait object respectively.
//!
//! ## Quick start
//!
//! ```
//! use asl_interpreter::{build_machine, ExecutionContext, TaskExecutor, TaskError};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl TaskExecutor for Echo {
//!     async fn invoke(
//!         &self,
//!         _resource: &str,
//!         input: Value,
//!         _credentials: Option<&Value>,
//!     ) -> Result<Value, TaskError> {
//!         Ok(input)
//!     }
//! }
//!
//! # async fn run() -> miette::Result<()> {
//! let definition = json!({
//!     "StartAt": "Hello",
//!     "States": {
//!         "Hello": { "Type": "Pass", "Result": {"greeting": "hi"}, "End": true }
//!     }
//! });
//!
//! let machine = build_machine(&definition)?;
//! let ctx = ExecutionContext::new(Arc::new(Echo));
//! let mut execution = machine.start_execution(json!({}), "run-1", ctx);
//! execution.run_all().await;
//! assert!(execution.status().is_succeeded());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`definition`] - the externally parsed, unvalidated tree
//! - [`machine`] - [`build_machine`] and the validated, runtime-ready [`Machine`]
//! - [`execution`] - the dispatcher that drives a [`Machine`] to a terminal status
//! - [`states`] - the seven state-kind handlers and the shared retry/catch loop
//! - [`parallel_runner`] - bounded-concurrency branch scheduling for Parallel
//! - [`filters`] - the six-stage I/O filter pipeline
//! - [`path`] - the restricted JSONPath reference dialect
//! - [`intrinsics`] - the `States.*` intrinsic function library
//! - [`retry`] - retrier/catcher matching and backoff
//! - [`context`] - [`ExecutionContext`], [`TaskExecutor`], and the injectable RNG
//! - [`error`] - [`DefinitionError`] and [`ErrorRecord`]
//! - [`telemetry`] - tracing spans and history/error rendering

pub mod context;
pub mod definition;
pub mod error;
pub mod execution;
pub mod filters;
pub mod intrinsics;
pub mod machine;
pub mod parallel_runner;
pub mod path;
pub mod retry;
pub mod states;
pub mod telemetry;

pub use context::{EngineConfig, EngineRng, ExecutionContext, OsRng, SeededRng, TaskError, TaskExecutor};
pub use error::{DefinitionError, ErrorRecord};
pub use execution::{Execution, Status};
pub use machine::{build_machine, Machine};
