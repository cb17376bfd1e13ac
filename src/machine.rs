//! The compiled, validated [`Machine`] (spec §3 "Machine"/"State-spec")
//! and [`build_machine`], its sole constructor.
//!
//! Grounded on `graphs/compilation.rs`'s `GraphBuilder::compile`
//! validation seam — a builder-style separation between an externally
//! parsed tree ([`crate::definition::RawMachine`]) and the validated,
//! runtime-ready form — and `graphs/builder.rs`'s reachability checks.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use crate::definition::{ChoiceRule, RawMachine, RawState, StateKind};
use crate::error::DefinitionError;
use crate::filters::PathSpec;
use crate::retry::{CatcherSpec, RetrierSpec};

/// A validated ASL machine, ready to drive executions. Immutable after
/// construction (spec §3): every `Next`/`Default`/`Catch[].Next` target
/// is guaranteed present in `states`, and Parallel branches are
/// themselves already-validated `Machine`s.
#[derive(Debug, Clone)]
pub struct Machine {
    pub comment: Option<String>,
    pub version: Option<String>,
    pub start_at: String,
    pub states: HashMap<String, CompiledState>,
    pub timeout_seconds: Option<u64>,
}

/// A state's common filter-pipeline fields plus its kind-specific
/// attributes, validated and ready for the dispatcher.
#[derive(Debug, Clone)]
pub struct CompiledState {
    pub comment: Option<String>,
    pub next: Option<String>,
    pub end: Option<bool>,
    pub input_path: PathSpec,
    pub output_path: PathSpec,
    pub parameters: Option<Value>,
    pub result_path: PathSpec,
    pub result_selector: Option<Value>,
    pub retry: Vec<RetrierSpec>,
    pub catch: Vec<CatcherSpec>,
    pub kind: CompiledKind,
}

#[derive(Debug, Clone)]
pub enum CompiledKind {
    Pass {
        result: Option<Value>,
    },
    Task {
        resource: String,
        timeout_seconds: Option<u64>,
        heartbeat_seconds: Option<u64>,
    },
    Choice {
        choices: Vec<ChoiceRule>,
        default: Option<String>,
    },
    Wait {
        seconds: Option<i64>,
        seconds_path: Option<String>,
        timestamp: Option<String>,
        timestamp_path: Option<String>,
    },
    Parallel {
        branches: Vec<Machine>,
        max_concurrency: usize,
    },
    Succeed,
    Fail {
        error: Option<String>,
        cause: Option<String>,
    },
}

impl CompiledState {
    /// Whether this state is one of the two terminal kinds (Succeed,
    /// Fail) or an `End: true` state of any other kind.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, CompiledKind::Succeed | CompiledKind::Fail { .. })
            || self.end == Some(true)
    }

    fn forward_targets(&self) -> Vec<&str> {
        match &self.kind {
            CompiledKind::Choice { choices, default } => {
                let mut targets: Vec<&str> = choices
                    .iter()
                    .filter_map(|c| c.next.as_deref())
                    .collect();
                targets.extend(default.as_deref());
                targets
            }
            CompiledKind::Succeed | CompiledKind::Fail { .. } => vec![],
            _ if self.end == Some(true) => vec![],
            _ => self.next.as_deref().into_iter().collect(),
        }
    }
}

/// Validate and compile a generic JSON definition tree into a
/// [`Machine`] (spec §6 "Definition format"). The input may be any
/// already-parsed JSON-like value — this crate does not read
/// serialized YAML/JSON text (spec §1 non-goal).
pub fn build_machine(definition: &Value) -> Result<Machine, DefinitionError> {
    let raw: RawMachine = serde_json::from_value(definition.clone())?;
    compile(raw)
}

fn compile(raw: RawMachine) -> Result<Machine, DefinitionError> {
    if !raw.states.contains_key(&raw.start_at) {
        return Err(DefinitionError::UnknownStartState(raw.start_at));
    }

    let mut states = HashMap::with_capacity(raw.states.len());
    for (name, state) in &raw.states {
        states.insert(name.clone(), compile_state(name, state.clone())?);
    }

    for (name, state) in &states {
        validate_targets(name, state, &states)?;
    }

    ensure_reachable_terminal(&raw.start_at, &states)?;

    Ok(Machine {
        comment: raw.comment,
        version: raw.version,
        start_at: raw.start_at,
        states,
        timeout_seconds: raw.timeout_seconds,
    })
}

fn compile_state(name: &str, raw: RawState) -> Result<CompiledState, DefinitionError> {
    let kind = match raw.kind {
        StateKind::Pass { result } => CompiledKind::Pass { result },
        StateKind::Task {
            resource,
            timeout_seconds,
            heartbeat_seconds,
        } => CompiledKind::Task {
            resource,
            timeout_seconds,
            heartbeat_seconds,
        },
        StateKind::Choice { choices, default } => {
            if choices.is_empty() {
                return Err(DefinitionError::InvalidShape {
                    state: name.to_string(),
                    message: "Choice state must have at least one entry in Choices".into(),
                });
            }
            for choice in &choices {
                if choice.next.is_none() {
                    return Err(DefinitionError::InvalidShape {
                        state: name.to_string(),
                        message: "every top-level Choices[] entry must set Next".into(),
                    });
                }
            }
            CompiledKind::Choice { choices, default }
        }
        StateKind::Wait {
            seconds,
            seconds_path,
            timestamp,
            timestamp_path,
        } => {
            let set_count = [
                seconds.is_some(),
                seconds_path.is_some(),
                timestamp.is_some(),
                timestamp_path.is_some(),
            ]
            .iter()
            .filter(|set| **set)
            .count();
            if set_count != 1 {
                return Err(DefinitionError::AmbiguousWait(name.to_string()));
            }
            CompiledKind::Wait {
                seconds,
                seconds_path,
                timestamp,
                timestamp_path,
            }
        }
        StateKind::Parallel {
            branches,
            max_concurrency,
        } => {
            if branches.is_empty() {
                return Err(DefinitionError::EmptyBranches(name.to_string()));
            }
            let max_concurrency = match max_concurrency {
                None => branches.len(),
                Some(value) if value >= 1 => value as usize,
                Some(value) => {
                    return Err(DefinitionError::InvalidMaxConcurrency {
                        state: name.to_string(),
                        value,
                    })
                }
            };
            let compiled_branches = branches
                .into_iter()
                .map(compile)
                .collect::<Result<Vec<_>, _>>()?;
            CompiledKind::Parallel {
                branches: compiled_branches,
                max_concurrency,
            }
        }
        StateKind::Succeed => CompiledKind::Succeed,
        StateKind::Fail { error, cause } => CompiledKind::Fail { error, cause },
    };

    let needs_transition = !matches!(kind, CompiledKind::Choice { .. } | CompiledKind::Succeed | CompiledKind::Fail { .. });
    if needs_transition && raw.next.is_some() == matches!(raw.end, Some(true)) {
        return Err(DefinitionError::MissingTransition(name.to_string()));
    }

    Ok(CompiledState {
        comment: raw.comment,
        next: raw.next,
        end: raw.end,
        input_path: raw.input_path,
        output_path: raw.output_path,
        parameters: raw.parameters,
        result_path: raw.result_path,
        result_selector: raw.result_selector,
        retry: raw.retry,
        catch: raw.catch,
        kind,
    })
}

fn validate_targets(
    name: &str,
    state: &CompiledState,
    states: &HashMap<String, CompiledState>,
) -> Result<(), DefinitionError> {
    let check = |target: &str| -> Result<(), DefinitionError> {
        if states.contains_key(target) {
            Ok(())
        } else {
            Err(DefinitionError::UnknownNextTarget {
                state: name.to_string(),
                target: target.to_string(),
            })
        }
    };

    match &state.kind {
        CompiledKind::Choice { choices, default } => {
            for choice in choices {
                if let Some(next) = &choice.next {
                    check(next)?;
                }
            }
            if let Some(default) = default {
                check(default)?;
            }
        }
        CompiledKind::Succeed | CompiledKind::Fail { .. } => {}
        _ => {
            if let Some(next) = &state.next {
                check(next)?;
            }
        }
    }

    for catcher in &state.catch {
        if !states.contains_key(&catcher.next) {
            return Err(DefinitionError::UnknownCatchTarget {
                state: name.to_string(),
                target: catcher.next.clone(),
            });
        }
    }

    Ok(())
}

fn ensure_reachable_terminal(
    start_at: &str,
    states: &HashMap<String, CompiledState>,
) -> Result<(), DefinitionError> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start_at.to_string()]);

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let Some(state) = states.get(&name) else {
            continue;
        };
        if state.is_terminal() {
            return Ok(());
        }
        for target in state.forward_targets() {
            queue.push_back(target.to_string());
        }
    }

    Err(DefinitionError::InvalidShape {
        state: start_at.to_string(),
        message: "no Succeed/Fail/End state is reachable from StartAt".into(),
    })
}
