//! Error taxonomy for the ASL interpreter.
//!
//! The spec splits errors into two families that never cross: definition
//! errors raised by [`crate::build_machine`] ([`DefinitionError`]) and
//! runtime error records carried through the retry/catch protocol and a
//! terminal execution's `error()` ([`ErrorRecord`]). Host/programmer-misuse
//! conditions the dispatcher catches itself — a missing `Next` target, a
//! `max_steps` overrun — are reported the same way, as an `ErrorRecord`
//! named [`names::RUNTIME`], rather than through a separate error type,
//! since [`crate::execution::Execution`] never returns a `Result` to begin
//! with. [`DefinitionError`] implements [`miette::Diagnostic`] so embedding
//! applications get rich, source-mapped diagnostics for free, following
//! `NodeError`/`JsonError`'s `thiserror` + `miette::Diagnostic` derive
//! style.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved ASL error names. Any other string is a user-defined error name.
pub mod names {
    pub const ALL: &str = "States.ALL";
    pub const TIMEOUT: &str = "States.Timeout";
    pub const TASK_FAILED: &str = "States.TaskFailed";
    pub const PERMISSIONS: &str = "States.Permissions";
    pub const RESULT_PATH_MATCH_FAILURE: &str = "States.ResultPathMatchFailure";
    pub const PARAMETER_PATH_FAILURE: &str = "States.ParameterPathFailure";
    pub const BRANCH_FAILED: &str = "States.BranchFailed";
    pub const NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
    pub const INTRINSIC_FAILURE: &str = "States.IntrinsicFailure";

    /// Not part of the ASL reserved set; this crate's own name for the
    /// "implementation-defined cancelled error" spec §5 leaves open,
    /// surfaced when a Parallel abort interrupts a sleeping Wait or a
    /// running Task in a sibling branch.
    pub const CANCELLED: &str = "States.Cancelled";

    /// Not part of the ASL reserved set; this crate's own name for
    /// host/programmer-misuse conditions the dispatcher catches itself
    /// (a `Next` target missing from the compiled machine, or
    /// `EngineConfig::max_steps` exceeded) rather than a workflow data
    /// error. Never matched by a retrier/catcher's `ErrorEquals`, since
    /// these conditions fail the execution directly instead of going
    /// through the retry/catch protocol.
    pub const RUNTIME: &str = "States.Runtime";
}

/// A runtime error record: `{Error, Cause}` as carried through retry/catch
/// and, on an unrecovered failure, attached to the terminal [`Execution`](crate::execution::Execution).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause", skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorRecord {
    pub fn new(error: impl Into<String>, cause: Option<String>) -> Self {
        Self {
            error: error.into(),
            cause,
        }
    }

    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::new(names::TASK_FAILED, Some(message.into()))
    }

    pub fn timeout() -> Self {
        Self::new(names::TIMEOUT, None)
    }

    /// Whether `States.ALL` (or this error's own name) would match this record.
    ///
    /// `States.ALL` matches any error except `States.Timeout`, unless
    /// `States.Timeout` is the error being matched *and* it was listed
    /// explicitly in the retrier/catcher's `ErrorEquals` — that check is
    /// done by the caller in [`crate::retry`]; this only tests plain
    /// name equality.
    pub fn matches_name(&self, name: &str) -> bool {
        self.error == name
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.error, cause),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for ErrorRecord {}

/// Errors raised while validating a definition tree in [`crate::build_machine`].
///
/// These never occur at run time: a successfully built [`crate::Machine`]
/// is guaranteed to satisfy every invariant this enum's variants guard.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    #[error("StartAt state '{0}' is not defined in States")]
    #[diagnostic(code(asl::definition::unknown_start_state))]
    UnknownStartState(String),

    #[error("state '{state}' has Next target '{target}' which is not defined in States")]
    #[diagnostic(code(asl::definition::unknown_next_target))]
    UnknownNextTarget { state: String, target: String },

    #[error("state '{state}' catcher targets '{target}' which is not defined in States")]
    #[diagnostic(code(asl::definition::unknown_catch_target))]
    UnknownCatchTarget { state: String, target: String },

    #[error("state '{0}' must have exactly one of Next or End=true")]
    #[diagnostic(
        code(asl::definition::missing_transition),
        help("non-terminal, non-Choice states must set exactly one of `Next` or `End: true`")
    )]
    MissingTransition(String),

    #[error("Parallel state '{0}' has zero Branches")]
    #[diagnostic(code(asl::definition::empty_branches))]
    EmptyBranches(String),

    #[error("Parallel state '{state}' has MaxConcurrency={value}, which must be >= 1")]
    #[diagnostic(code(asl::definition::invalid_max_concurrency))]
    InvalidMaxConcurrency { state: String, value: i64 },

    #[error("Wait state '{0}' must set exactly one of Seconds, SecondsPath, Timestamp, TimestampPath")]
    #[diagnostic(code(asl::definition::ambiguous_wait))]
    AmbiguousWait(String),

    #[error("{state}: {message}")]
    #[diagnostic(code(asl::definition::invalid_shape))]
    InvalidShape { state: String, message: String },

    #[error("failed to parse definition tree: {0}")]
    #[diagnostic(code(asl::definition::parse))]
    Parse(#[from] serde_json::Error),
}

/// A single history entry recorded by the dispatcher for every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state_name: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    pub output_snapshot: serde_json::Value,
}
