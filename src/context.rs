//! Execution context: the task executor callable, engine configuration,
//! and the injectable randomness source.
//!
//! Grounded on `node.rs`'s `NodeContext` — a typed record of execution
//! environment, not a stringly-keyed map — and the Design Notes'
//! explicit instruction to parameterize the PRNG for deterministic
//! testing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Error surfaced by a [`TaskExecutor`] invocation.
///
/// Mirrors §6: a raised value that already carries a structured
/// `{Error, Cause}` is used verbatim; anything else becomes
/// `States.TaskFailed` with the message as `Cause`.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("{error}: {cause}")]
    Structured { error: String, cause: String },
    #[error("{0}")]
    Message(String),
}

impl TaskError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    pub fn structured(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Structured {
            error: error.into(),
            cause: cause.into(),
        }
    }

    /// Convert into the `{Error, Cause}` record the retry/catch engine matches on.
    pub fn into_record(self) -> crate::error::ErrorRecord {
        match self {
            TaskError::Structured { error, cause } => {
                crate::error::ErrorRecord::new(error, Some(cause))
            }
            TaskError::Message(message) => crate::error::ErrorRecord::task_failed(message),
        }
    }
}

/// The Task resource executor: the engine's sole injected side-effect.
///
/// The engine never interprets `resource`; it is an opaque URI
/// (`method:foo`, `arn:aws:lambda:...`) meaningful only to the host's
/// implementation.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn invoke(
        &self,
        resource: &str,
        input: Value,
        credentials: Option<&Value>,
    ) -> Result<Value, TaskError>;
}

/// Source of randomness for `States.UUID` and `States.MathRandom`,
/// injected through [`ExecutionContext`] so production callers get OS
/// entropy and tests get a seeded, reproducible sequence.
pub trait EngineRng: Send + Sync {
    /// A fresh version-4 UUID.
    fn uuid_v4(&self) -> Uuid;
    /// An integer uniformly distributed in `[lo, hi]` inclusive.
    fn range_inclusive(&self, lo: i64, hi: i64) -> i64;
}

/// The default RNG: OS-backed entropy via `rand`/`uuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRng;

impl EngineRng for OsRng {
    fn uuid_v4(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn range_inclusive(&self, lo: i64, hi: i64) -> i64 {
        use rand::Rng;
        if hi <= lo {
            return lo;
        }
        rand::rng().random_range(lo..=hi)
    }
}

/// A seeded RNG for deterministic tests.
///
/// Wraps a `rand::rngs::StdRng` behind a `Mutex` since [`EngineRng`]
/// methods take `&self` (the trait is shared across Parallel branches).
pub struct SeededRng(std::sync::Mutex<rand::rngs::StdRng>);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self(std::sync::Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)))
    }
}

impl EngineRng for SeededRng {
    fn uuid_v4(&self) -> Uuid {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        self.0.lock().expect("rng mutex poisoned").fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    fn range_inclusive(&self, lo: i64, hi: i64) -> i64 {
        use rand::Rng;
        if hi <= lo {
            return lo;
        }
        self.0.lock().expect("rng mutex poisoned").random_range(lo..=hi)
    }
}

/// Fallback retrier parameters used whenever a state's `Retry` entry
/// omits `IntervalSeconds`/`MaxAttempts`/`BackoffRate` (§4.4, §4.12).
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetry {
    pub interval_seconds: u64,
    pub max_attempts: u32,
    pub backoff_rate: f64,
}

impl Default for DefaultRetry {
    fn default() -> Self {
        Self {
            interval_seconds: 1,
            max_attempts: 3,
            backoff_rate: 2.0,
        }
    }
}

/// Engine-wide configuration, carried as typed fields rather than a
/// free-form mutable map (§4.12).
#[derive(Clone)]
pub struct EngineConfig {
    /// Safeguard bounding the dispatcher's transition loop (§4.10).
    pub max_steps: Option<u64>,
    /// Fallback retrier parameters for `Retry` entries with missing fields.
    pub default_retry: DefaultRetry,
    /// Randomness source for `States.UUID`/`States.MathRandom`.
    pub rng: Arc<dyn EngineRng>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(10_000),
            default_retry: DefaultRetry::default(),
            rng: Arc::new(OsRng),
        }
    }
}

/// Everything a running [`crate::execution::Execution`] needs that is not
/// part of the working document itself: the task executor, optional
/// credentials, and engine configuration.
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_executor: Arc<dyn TaskExecutor>,
    pub credentials: Option<Value>,
    pub config: EngineConfig,
}

impl ExecutionContext {
    pub fn new(task_executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            task_executor,
            credentials: None,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Value) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}
