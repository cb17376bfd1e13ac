//! Drives a small order-processing machine to completion with tracing
//! enabled, demonstrating retry/catch recovery and the plain-text
//! history/error rendering in [`asl_interpreter::telemetry`].
//!
//! Run with: `cargo run --example run_machine`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use asl_interpreter::telemetry::{PlainFormatter, TelemetryFormatter};
use asl_interpreter::{build_machine, ExecutionContext, TaskError, TaskExecutor};
use miette::Result;
use serde_json::{json, Value};
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A task executor that fails the first two times a resource is invoked,
/// then succeeds, to exercise the Retry/Catch pipeline end to end.
struct FlakyCharge {
    attempts: AtomicUsize,
}

#[async_trait]
impl TaskExecutor for FlakyCharge {
    async fn invoke(
        &self,
        resource: &str,
        input: Value,
        _credentials: Option<&Value>,
    ) -> Result<Value, TaskError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if resource == "method:charge-card" && attempt <= 2 {
            return Err(TaskError::structured(
                "Charge.Declined",
                format!("issuer timeout on attempt {attempt}"),
            ));
        }
        Ok(input)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,asl_interpreter=info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    miette::set_panic_hook();

    let definition = json!({
        "Comment": "Charge a card with retry, falling back to manual review on failure",
        "StartAt": "ChargeCard",
        "States": {
            "ChargeCard": {
                "Type": "Task",
                "Resource": "method:charge-card",
                "Retry": [{
                    "ErrorEquals": ["Charge.Declined"],
                    "IntervalSeconds": 0,
                    "MaxAttempts": 3,
                    "BackoffRate": 2.0
                }],
                "Catch": [{
                    "ErrorEquals": ["States.ALL"],
                    "Next": "ManualReview",
                    "ResultPath": "$.error"
                }],
                "ResultPath": "$.charge",
                "Next": "Done"
            },
            "ManualReview": {
                "Type": "Pass",
                "Parameters": {"status.$": "States.Format(\"needs review: {}\", $.error.Cause)"},
                "ResultPath": "$.review",
                "End": true
            },
            "Done": {"Type": "Succeed"}
        }
    });

    let machine = build_machine(&definition)?;
    let executor = Arc::new(FlakyCharge {
        attempts: AtomicUsize::new(0),
    });
    let ctx = ExecutionContext::new(executor);
    let mut execution = machine.start_execution(json!({"order_id": "ord_1"}), "demo-run", ctx);

    info!("starting execution {}", execution.name());
    execution.run_all().await;

    let formatter = PlainFormatter;
    for render in formatter.render_history(execution.history()) {
        print!("{}", render.join_lines());
    }
    if let Some(error) = execution.error() {
        print!("{}", formatter.render_error(error).join_lines());
    }

    println!(
        "\nfinal status: {:?}\nfinal output: {}",
        execution.status(),
        execution.output()
    );

    Ok(())
}
