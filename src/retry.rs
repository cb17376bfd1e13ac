//! Retrier/catcher matching and backoff arithmetic (spec §4.4).
//!
//! Grounded on `node.rs`'s split between a node's own error handling and
//! the runtime's retry loop, generalized here into a pure decision
//! function (`RetryTracker::next_action`) so `states::task` can drive the
//! sleep/retry/catch loop without duplicating the `States.ALL` matching
//! rules. Backoff timing uses `tokio::time::sleep`, from this workspace's
//! `tokio` feature set (`time`).

use std::time::Duration;

use serde::Deserialize;

use crate::context::DefaultRetry;
use crate::error::{names, ErrorRecord};
use crate::filters::PathSpec;

/// One entry of a state's `Retry` array. A field left unset here falls
/// back to the engine's configured [`DefaultRetry`] (§4.12), not a
/// fixed constant, so hosts can tune retry behavior without touching
/// every state definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetrierSpec {
    pub error_equals: Vec<String>,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_rate: Option<f64>,
}

/// One entry of a state's `Catch` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatcherSpec {
    pub error_equals: Vec<String>,
    pub next: String,
    #[serde(default)]
    pub result_path: PathSpec,
}

/// What a Task/Parallel/Map state handler should do after a work step raises an error.
#[derive(Debug, Clone)]
pub enum Action {
    Retry { delay: Duration },
    Catch { catcher_index: usize },
    Fail,
}

/// `error_equals` matching rule for a single retrier/catcher entry.
///
/// `States.ALL` matches everything except `States.Timeout`, unless
/// `States.Timeout` is also listed explicitly, or this entry is the
/// *only* retrier/catcher in its state's list (`sole_entry` — with
/// nowhere else for a timeout to go, `States.ALL` there is read as
/// "match everything, no exceptions").
pub fn matches_error(error_equals: &[String], error: &ErrorRecord, sole_entry: bool) -> bool {
    let has_all = error_equals.iter().any(|e| e == names::ALL);
    let has_timeout_explicit = error_equals.iter().any(|e| e == names::TIMEOUT);

    if error.matches_name(names::TIMEOUT) {
        if has_timeout_explicit {
            return true;
        }
        return has_all && sole_entry;
    }

    if has_all {
        return true;
    }
    error_equals.iter().any(|e| error.matches_name(e))
}

/// Per-invocation attempt counters, one per retrier, reset at the start
/// of every fresh entry into the owning state.
pub struct RetryTracker {
    attempts: Vec<u32>,
}

impl RetryTracker {
    pub fn new(retriers: &[RetrierSpec]) -> Self {
        Self {
            attempts: vec![0; retriers.len()],
        }
    }

    /// Decide what to do after `error` was raised, given the state's
    /// `Retry` and `Catch` arrays (both scanned in array order — the
    /// first match wins).
    pub fn next_action(
        &mut self,
        retriers: &[RetrierSpec],
        catchers: &[CatcherSpec],
        error: &ErrorRecord,
        defaults: &DefaultRetry,
    ) -> Action {
        let sole_retrier = retriers.len() == 1;
        if let Some((index, retrier)) = retriers
            .iter()
            .enumerate()
            .find(|(_, r)| matches_error(&r.error_equals, error, sole_retrier))
        {
            let max_attempts = retrier.max_attempts.unwrap_or(defaults.max_attempts);
            if self.attempts[index] < max_attempts {
                let attempt_number = self.attempts[index] + 1;
                self.attempts[index] = attempt_number;
                let delay = backoff_delay(retrier, attempt_number, defaults);
                return Action::Retry { delay };
            }
        }

        let sole_catcher = catchers.len() == 1;
        if let Some(index) = catchers
            .iter()
            .position(|c| matches_error(&c.error_equals, error, sole_catcher))
        {
            return Action::Catch {
                catcher_index: index,
            };
        }

        Action::Fail
    }
}

fn backoff_delay(retrier: &RetrierSpec, attempt_number: u32, defaults: &DefaultRetry) -> Duration {
    let interval_seconds = retrier.interval_seconds.unwrap_or(defaults.interval_seconds);
    let backoff_rate = retrier.backoff_rate.unwrap_or(defaults.backoff_rate);
    let exponent = (attempt_number - 1) as i32;
    let seconds = interval_seconds as f64 * backoff_rate.powi(exponent);
    Duration::from_secs_f64(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrier(errors: &[&str], max_attempts: u32) -> RetrierSpec {
        RetrierSpec {
            error_equals: errors.iter().map(|s| s.to_string()).collect(),
            interval_seconds: Some(1),
            max_attempts: Some(max_attempts),
            backoff_rate: Some(2.0),
        }
    }

    #[test]
    fn states_all_excludes_timeout_by_default() {
        let equals = vec![names::ALL.to_string(), "CustomError".to_string()];
        let timeout = ErrorRecord::timeout();
        assert!(!matches_error(&equals, &timeout, false));
        let custom = ErrorRecord::new("CustomError", None);
        assert!(matches_error(&equals, &custom, false));
    }

    #[test]
    fn bare_states_all_as_sole_entry_includes_timeout() {
        let equals = vec![names::ALL.to_string()];
        let timeout = ErrorRecord::timeout();
        assert!(matches_error(&equals, &timeout, true));
        assert!(!matches_error(&equals, &timeout, false));
    }

    #[test]
    fn explicit_timeout_entry_is_matched() {
        let equals = vec![names::ALL.to_string(), names::TIMEOUT.to_string()];
        let timeout = ErrorRecord::timeout();
        assert!(matches_error(&equals, &timeout, false));
    }

    #[test]
    fn retries_up_to_max_attempts_then_falls_through() {
        let retriers = vec![retrier(&[names::ALL], 2)];
        let catchers = vec![CatcherSpec {
            error_equals: vec![names::ALL.to_string()],
            next: "Fallback".into(),
            result_path: PathSpec::Default,
        }];
        let mut tracker = RetryTracker::new(&retriers);
        let error = ErrorRecord::task_failed("boom");
        let defaults = DefaultRetry::default();

        match tracker.next_action(&retriers, &catchers, &error, &defaults) {
            Action::Retry { delay } => assert_eq!(delay, Duration::from_secs(1)),
            other => panic!("expected first retry, got {other:?}"),
        }
        match tracker.next_action(&retriers, &catchers, &error, &defaults) {
            Action::Retry { delay } => assert_eq!(delay, Duration::from_secs(2)),
            other => panic!("expected second retry with doubled backoff, got {other:?}"),
        }
        match tracker.next_action(&retriers, &catchers, &error, &defaults) {
            Action::Catch { catcher_index } => assert_eq!(catcher_index, 0),
            other => panic!("expected catch after exhausting retries, got {other:?}"),
        }
    }

    #[test]
    fn no_match_anywhere_propagates() {
        let retriers = vec![retrier(&["SpecificError"], 3)];
        let catchers = vec![];
        let mut tracker = RetryTracker::new(&retriers);
        let error = ErrorRecord::task_failed("unrelated");
        assert!(matches!(
            tracker.next_action(&retriers, &catchers, &error, &DefaultRetry::default()),
            Action::Fail
        ));
    }

    #[test]
    fn missing_fields_fall_back_to_configured_defaults() {
        let retriers = vec![RetrierSpec {
            error_equals: vec![names::ALL.to_string()],
            interval_seconds: None,
            max_attempts: None,
            backoff_rate: None,
        }];
        let catchers = vec![];
        let mut tracker = RetryTracker::new(&retriers);
        let error = ErrorRecord::task_failed("boom");
        let defaults = DefaultRetry {
            interval_seconds: 5,
            max_attempts: 1,
            backoff_rate: 3.0,
        };

        match tracker.next_action(&retriers, &catchers, &error, &defaults) {
            Action::Retry { delay } => assert_eq!(delay, Duration::from_secs(5)),
            other => panic!("expected retry using configured default interval, got {other:?}"),
        }
        assert!(matches!(
            tracker.next_action(&retriers, &catchers, &error, &defaults),
            Action::Fail
        ));
    }
}
