//!
//! Health center
//! -------------
//! One aggregator task owns the latest result of every check. Callers talk to it over a
//! command channel; each registered check runs in its own task and reports completions
//! on a second channel. A slow or hung check only delays its own next run.
//!
//! Deregistering a check stops its schedule between runs. A run already in flight is left
//! to finish and its result is dropped by generation.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{AggregateStatus, CheckError, CheckRegistration, CheckResult, HealthCheck, HealthError};

enum Command {
    Register { registration: CheckRegistration, check: Arc<dyn HealthCheck>, reply: oneshot::Sender<Result<(), HealthError>> },
    Deregister { name: String, reply: oneshot::Sender<bool> },
    DeregisterAll { reply: oneshot::Sender<usize> },
    Snapshot { reply: oneshot::Sender<AggregateStatus> },
    Shutdown { reply: oneshot::Sender<usize> },
}

struct Completion {
    name: String,
    generation: u64,
    started: DateTime<Utc>,
    duration: Duration,
    outcome: Result<Value, CheckError>,
}

struct Entry {
    generation: u64,
    latest: CheckResult,
    // dropped to stop the schedule before its next run
    _stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Handle to a running health center. Cheap to clone; all clones share one set of
/// checks. The center stops, aborting every check task, once [`HealthCenter::shutdown`]
/// is called or the last handle is dropped.
#[derive(Clone, Debug)]
pub struct HealthCenter {
    commands: mpsc::UnboundedSender<Command>,
}

impl HealthCenter {
    /// Start the aggregator. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let aggregator = Aggregator { entries: BTreeMap::new(), next_generation: 0, completions };
        tokio::spawn(aggregator.run(command_rx, completion_rx));
        Self { commands }
    }

    /// Add a check and start its schedule. The check first runs after
    /// `initial_delay`, then every `period`.
    pub async fn register_check(&self, registration: CheckRegistration, check: Arc<dyn HealthCheck>) -> Result<(), HealthError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Register { registration, check, reply })?;
        rx.await.map_err(|_| HealthError::ShutDown)?
    }

    /// Latest result of every registered check, ordered by name.
    pub async fn snapshot(&self) -> AggregateStatus {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Snapshot { reply }).is_err() {
            return AggregateStatus::unavailable();
        }
        rx.await.unwrap_or_else(|_| AggregateStatus::unavailable())
    }

    /// Stop and forget one check. Returns whether it was registered. A run in progress
    /// completes but is never recorded.
    pub async fn deregister(&self, name: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Deregister { name: name.to_string(), reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop and forget every check, returning how many there were.
    pub async fn deregister_all(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::DeregisterAll { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Deregister everything and stop the aggregator. Later calls on any clone see a
    /// shut-down center. Idempotent.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).is_err() {
            return;
        }
        if let Ok(stopped) = rx.await {
            info!(checks = stopped, "health center stopped");
        }
    }

    pub fn is_shut_down(&self) -> bool { self.commands.is_closed() }

    fn send(&self, cmd: Command) -> Result<(), HealthError> {
        self.commands.send(cmd).map_err(|_| HealthError::ShutDown)
    }
}

struct Aggregator {
    entries: BTreeMap<String, Entry>,
    next_generation: u64,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Aggregator {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, mut completions: mpsc::UnboundedReceiver<Completion>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle(cmd) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(done) = completions.recv() => self.apply(done),
            }
        }
        for (_, entry) in std::mem::take(&mut self.entries) {
            entry.task.abort();
        }
        debug!("health aggregator exited");
    }

    /// Returns false once the center should stop.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Register { registration, check, reply } => {
                let _ = reply.send(self.register(registration, check));
            }
            Command::Deregister { name, reply } => {
                let removed = self.entries.remove(&name).is_some();
                if removed {
                    info!(check = %name, "health check deregistered");
                }
                let _ = reply.send(removed);
            }
            Command::DeregisterAll { reply } => {
                let _ = reply.send(self.remove_all());
            }
            Command::Snapshot { reply } => {
                let results = self.entries.values().map(|e| e.latest.clone()).collect();
                let _ = reply.send(AggregateStatus::from_results(results));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.entries.len());
                return false;
            }
        }
        true
    }

    fn register(&mut self, registration: CheckRegistration, check: Arc<dyn HealthCheck>) -> Result<(), HealthError> {
        let name = registration.name.clone();
        if name.trim().is_empty() {
            return Err(HealthError::EmptyName);
        }
        if registration.period.is_zero() {
            return Err(HealthError::InvalidPeriod { name });
        }
        if self.entries.contains_key(&name) {
            return Err(HealthError::DuplicateCheck { name });
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let latest = CheckResult::pending(&registration, Utc::now());
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run_schedule(registration.clone(), generation, check, self.completions.clone(), stopped));
        info!(
            check = %name,
            period_ms = registration.period.as_millis() as u64,
            initial_delay_ms = registration.initial_delay.as_millis() as u64,
            initially_passing = registration.initially_passing,
            "health check registered"
        );
        self.entries.insert(name, Entry { generation, latest, _stop: stop, task });
        Ok(())
    }

    fn remove_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    fn apply(&mut self, done: Completion) {
        let Some(entry) = self.entries.get_mut(&done.name) else {
            debug!(check = %done.name, "dropping result of a deregistered check");
            return;
        };
        // a stale run of an earlier registration under the same name
        if entry.generation != done.generation {
            return;
        }
        let next = entry.latest.next(done.started, done.duration, done.outcome);
        if entry.latest.passing && !next.passing {
            warn!(
                check = %next.name,
                error = next.error.as_deref().unwrap_or(""),
                failures = next.contiguous_failures,
                "health check started failing"
            );
        } else if !entry.latest.passing && next.passing {
            info!(check = %next.name, "health check passing");
        } else if !next.passing {
            debug!(check = %next.name, failures = next.contiguous_failures, "health check still failing");
        }
        entry.latest = next;
    }
}

async fn run_schedule(
    registration: CheckRegistration,
    generation: u64,
    check: Arc<dyn HealthCheck>,
    completions: mpsc::UnboundedSender<Completion>,
    mut stop: oneshot::Receiver<()>,
) {
    tokio::select! {
        biased;
        _ = &mut stop => return,
        _ = tokio::time::sleep(registration.initial_delay) => {}
    }
    let mut ticker = tokio::time::interval(registration.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // only the wait is cancellable; a started run always completes
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }
        let started = Utc::now();
        let clock = Instant::now();
        let outcome = match AssertUnwindSafe(check.execute()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(CheckError::new(format!("check panicked: {}", panic_message(panic.as_ref())))),
        };
        let done = Completion { name: registration.name.clone(), generation, started, duration: clock.elapsed(), outcome };
        if completions.send(done).is_err() {
            break;
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
#[path = "center_tests.rs"]
mod center_tests;
