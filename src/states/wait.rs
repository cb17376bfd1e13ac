//! Wait state (spec §4.6): sleeps until its condition elapses, then
//! transitions. Only `InputPath`/`OutputPath` apply. Cancellable via an
//! optional `watch` receiver so a Parallel branch (spec §5) can abort a
//! sleeping branch promptly instead of letting it run to completion.

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Duration;

use crate::context::DefaultRetry;
use crate::error::{names, ErrorRecord};
use crate::filters::{apply_input_path, apply_output_path};
use crate::machine::CompiledState;
use crate::path::RefPath;
use crate::states::{next_of, run_with_retry, Next};

pub struct WaitAttrs<'a> {
    pub seconds: Option<i64>,
    pub seconds_path: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub timestamp_path: Option<&'a str>,
}

pub async fn run(
    raw_input: &Value,
    state: &CompiledState,
    attrs: &WaitAttrs<'_>,
    cancel: Option<&watch::Receiver<bool>>,
    defaults: &DefaultRetry,
) -> Result<(Value, Next), ErrorRecord> {
    run_with_retry(raw_input, &state.retry, &state.catch, defaults, || async {
        let filtered = apply_input_path(raw_input, &state.input_path)?;
        let duration = compute_duration(attrs, &filtered)?;
        sleep_cancellable(duration, cancel).await?;
        let output = apply_output_path(&filtered, &state.output_path)?;
        Ok((output, next_of(state)))
    })
    .await
}

fn compute_duration(attrs: &WaitAttrs<'_>, document: &Value) -> Result<Duration, ErrorRecord> {
    if let Some(seconds) = attrs.seconds {
        return Ok(Duration::from_secs(seconds.max(0) as u64));
    }
    if let Some(path) = attrs.seconds_path {
        let seconds = resolve_number(path, document)?;
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }
    if let Some(timestamp) = attrs.timestamp {
        return Ok(duration_until(timestamp)?);
    }
    if let Some(path) = attrs.timestamp_path {
        let resolved = RefPath::parse(path)
            .ok()
            .and_then(|p| p.resolve(document).and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| {
                ErrorRecord::new(names::PARAMETER_PATH_FAILURE, Some(format!("'{path}' did not resolve to a string")))
            })?;
        return duration_until(&resolved);
    }
    unreachable!("build_machine guarantees exactly one Wait condition is set")
}

fn resolve_number(path: &str, document: &Value) -> Result<f64, ErrorRecord> {
    RefPath::parse(path)
        .ok()
        .and_then(|p| p.resolve(document))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            ErrorRecord::new(
                names::PARAMETER_PATH_FAILURE,
                Some(format!("'{path}' did not resolve to a number")),
            )
        })
}

fn duration_until(timestamp: &str) -> Result<Duration, ErrorRecord> {
    let target = chrono::DateTime::parse_from_rfc3339(timestamp).map_err(|e| {
        ErrorRecord::new(
            names::PARAMETER_PATH_FAILURE,
            Some(format!("invalid timestamp '{timestamp}': {e}")),
        )
    })?;
    let now = Utc::now();
    let delta = target.with_timezone(&Utc) - now;
    Ok(delta.to_std().unwrap_or(Duration::ZERO))
}

async fn sleep_cancellable(
    duration: Duration,
    cancel: Option<&watch::Receiver<bool>>,
) -> Result<(), ErrorRecord> {
    match cancel {
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
        Some(cancel) => {
            if *cancel.borrow() {
                return Err(ErrorRecord::new(names::CANCELLED, None));
            }
            let mut cancel = cancel.clone();
            tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(()),
                changed = cancel.changed() => {
                    match changed {
                        Ok(()) if *cancel.borrow() => Err(ErrorRecord::new(names::CANCELLED, None)),
                        _ => {
                            tokio::time::sleep(duration).await;
                            Ok(())
                        }
                    }
                }
            }
        }
    }
}
