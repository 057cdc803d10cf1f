//!
//! Health checks
//! -------------
//! A [`center::HealthCenter`] owns a set of named checks, each running on its own
//! schedule, and answers snapshot requests with the latest result of every check.
//!
//! State per check: `Pending` until its first run completes, then `Passing` or
//! `Failing` depending on the most recent run. A pending check counts as healthy only
//! if it was registered as initially passing. Overall health is the AND over all
//! checks.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod center;
pub mod liveliness;
pub mod report;

pub use center::HealthCenter;
pub use liveliness::DbLivelinessCheck;
pub use report::{DetailedView, SummaryView};

/// Failure of a single check run. Recorded in the check's result; never escalated.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CheckError {
    pub message: String,
    pub details: Option<Value>,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into(), details: None } }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("a health check named '{name}' is already registered")]
    DuplicateCheck { name: String },
    #[error("health check names must not be empty")]
    EmptyName,
    #[error("health check '{name}' needs a non-zero execution period")]
    InvalidPeriod { name: String },
    #[error("the health center has been shut down")]
    ShutDown,
}

/// Something that can be executed periodically to determine part of the service health.
/// `Ok` marks the run as passing, `Err` as failing; either way the payload is kept as
/// the run's details.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn execute(&self) -> Result<Value, CheckError>;
}

/// Adapts an async closure into a [`HealthCheck`].
pub struct FnCheck<F>(pub F);

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CheckError>> + Send,
{
    async fn execute(&self) -> Result<Value, CheckError> { (self.0)().await }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRegistration {
    pub name: String,
    pub period: Duration,
    pub initial_delay: Duration,
    pub initially_passing: bool,
}

impl CheckRegistration {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self { name: name.into(), period, initial_delay: Duration::ZERO, initially_passing: false }
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn initially_passing(mut self, passing: bool) -> Self {
        self.initially_passing = passing;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Pending,
    Passing,
    Failing,
}

/// Latest known outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub state: CheckState,
    pub passing: bool,
    /// Start of the run, or the registration time while pending.
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub details: Option<Value>,
    pub duration_ms: u64,
    pub contiguous_failures: u64,
    pub time_of_first_failure: Option<DateTime<Utc>>,
}

impl CheckResult {
    pub fn pending(registration: &CheckRegistration, registered_at: DateTime<Utc>) -> Self {
        Self {
            name: registration.name.clone(),
            state: CheckState::Pending,
            passing: registration.initially_passing,
            timestamp: registered_at,
            error: None,
            details: None,
            duration_ms: 0,
            contiguous_failures: 0,
            time_of_first_failure: None,
        }
    }

    /// Fold one run outcome onto the previous result.
    pub fn next(&self, started: DateTime<Utc>, duration: Duration, outcome: Result<Value, CheckError>) -> Self {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(details) => Self {
                name: self.name.clone(),
                state: CheckState::Passing,
                passing: true,
                timestamp: started,
                error: None,
                details: Some(details),
                duration_ms,
                contiguous_failures: 0,
                time_of_first_failure: None,
            },
            Err(e) => Self {
                name: self.name.clone(),
                state: CheckState::Failing,
                passing: false,
                timestamp: started,
                error: Some(e.message),
                details: e.details,
                duration_ms,
                contiguous_failures: self.contiguous_failures + 1,
                time_of_first_failure: self.time_of_first_failure.or(Some(started)),
            },
        }
    }
}

/// Read-time projection over the latest results, ordered by check name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatus {
    pub checks: Vec<CheckResult>,
    pub healthy: bool,
}

impl AggregateStatus {
    pub fn from_results(checks: Vec<CheckResult>) -> Self {
        let healthy = checks.iter().all(|c| c.passing);
        Self { checks, healthy }
    }

    /// What a snapshot reports once the center is gone.
    pub fn unavailable() -> Self { Self { checks: Vec::new(), healthy: false } }

    pub fn get(&self, name: &str) -> Option<&CheckResult> { self.checks.iter().find(|c| c.name == name) }
}
