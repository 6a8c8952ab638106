pub mod supervisor;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::errors::HandlerError;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::engine::DerivationEngine;
use crate::queue::lease::WorkerLease;
use crate::queue::record::{InFlightRecord, SubjectRef, Task, TaskKind};
use crate::queue::{Claim, TaskQueue};
use crate::resolve;

/// Maps a subject to the current location of its original image.
/// Supplied by the CRUD layer; `Ok(None)` means the subject was deleted
/// before the task ran, which the worker completes as a no-op.
pub trait SubjectStore: Send + Sync + 'static {
    fn source_path(&self, subject: &SubjectRef) -> Result<Option<PathBuf>>;
}

/// Subject lookup backed by a JSON manifest mapping `"kind/id"` keys to
/// source paths, e.g. `{"project/42": "/data/upload/hero.png"}`. Lets the
/// operator CLI drain a queue in the foreground without the CRUD layer.
pub struct ManifestSubjectStore {
    sources: HashMap<String, PathBuf>,
}

impl ManifestSubjectStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).context(format!("failed to read subject manifest {path:?}"))?;
        let sources = serde_json::from_slice(&bytes)
            .context(format!("failed to parse subject manifest {path:?}"))?;
        Ok(Self { sources })
    }
}

impl SubjectStore for ManifestSubjectStore {
    fn source_path(&self, subject: &SubjectRef) -> Result<Option<PathBuf>> {
        Ok(self.sources.get(&subject.to_string()).cloned())
    }
}

/// The single background consumer of one queue root. Pulls the oldest
/// pending record, claims it, dispatches by task kind, and exits after
/// the queue has stayed empty past the idle grace period.
pub struct Worker {
    queue: Arc<TaskQueue>,
    subjects: Arc<dyn SubjectStore>,
    config: Arc<PipelineConfig>,
    engine: DerivationEngine,
    owner_id: Uuid,
}

impl Worker {
    pub fn new(
        queue: Arc<TaskQueue>,
        subjects: Arc<dyn SubjectStore>,
        config: Arc<PipelineConfig>,
        owner_id: Uuid,
    ) -> Self {
        let engine = DerivationEngine::new(config.clone());
        Self {
            queue,
            subjects,
            config,
            engine,
            owner_id,
        }
    }

    pub fn run(&self) {
        if let Err(err) = self.run_loop() {
            error!("worker loop failed: {err:?}");
        }
        self.release_lease();
    }

    fn run_loop(&self) -> Result<()> {
        let mut idle_since: Option<Instant> = None;
        loop {
            if !self.refresh_lease()? {
                info!("worker lease taken over, worker {} exiting", self.owner_id);
                return Ok(());
            }

            let Some(record) = self.queue.peek_all()?.into_iter().next() else {
                let idle = *idle_since.get_or_insert_with(Instant::now);
                if idle.elapsed() >= self.config.idle_timeout() {
                    // Give up the lease before the final look. An enqueue
                    // racing with shutdown either finds no lease and
                    // spawns a fresh worker, or its record shows up in
                    // this re-check and we resume instead of exiting.
                    self.release_lease();
                    if self.queue.peek_all()?.is_empty() {
                        info!("queue drained, worker {} exiting", self.owner_id);
                        return Ok(());
                    }
                    idle_since = None;
                    continue;
                }
                thread::sleep(self.config.poll_interval());
                continue;
            };
            idle_since = None;

            match self.queue.claim(&record)? {
                // Another worker got there first; just poll again.
                Claim::AlreadyClaimed => continue,
                Claim::Claimed(in_flight) => self.handle(in_flight)?,
            }
        }
    }

    fn handle(&self, in_flight: InFlightRecord) -> Result<()> {
        let task = in_flight.task.clone();
        match self.dispatch(&task) {
            Ok(()) => self.queue.complete(in_flight),
            Err(HandlerError::SubjectGone(subject)) => {
                info!("subject {subject} vanished before task {} ran, completing as no-op", task.id);
                self.queue.complete(in_flight)
            }
            Err(err) => {
                let reason = format!("{:#}", anyhow::Error::new(err));
                warn!(
                    "task {} ({}) failed on attempt {}: {reason}",
                    task.id,
                    task.kind.label(),
                    task.attempts + 1
                );
                match self.config.retry {
                    RetryPolicy::Bounded {
                        max_attempts,
                        backoff_ms,
                    } if task.attempts + 1 < max_attempts => {
                        thread::sleep(Duration::from_millis(
                            backoff_ms * (task.attempts as u64 + 1),
                        ));
                        self.queue.retry(in_flight, &reason)
                    }
                    _ => {
                        error!("dead-lettering task {} after {} attempts", task.id, task.attempts + 1);
                        self.queue.fail(in_flight, &reason)
                    }
                }
            }
        }
    }

    fn dispatch(&self, task: &Task) -> Result<(), HandlerError> {
        match &task.kind {
            TaskKind::Create { subject }
            | TaskKind::Update { subject }
            | TaskKind::BulkUpdate { subject } => {
                let source = self
                    .subjects
                    .source_path(subject)
                    .map_err(HandlerError::Other)?
                    .ok_or_else(|| HandlerError::SubjectGone(subject.to_string()))?;
                let set = self.engine.process(&source, &task.policy)?;
                debug!(
                    "task {}: {} derivatives written for {subject}",
                    task.id,
                    set.written().count()
                );
                Ok(())
            }
            TaskKind::Cleanup {
                subject,
                stale_path,
            } => {
                let deleted =
                    resolve::delete_derivatives(stale_path).map_err(HandlerError::Other)?;
                info!("cleanup for {subject}: removed {deleted} derivatives of {stale_path:?}");
                Ok(())
            }
        }
    }

    /// Re-stamp our lease each iteration so a long drain is never
    /// mistaken for a crash. Returns false when another worker owns the
    /// lease now, which means this one should bow out.
    fn refresh_lease(&self) -> Result<bool> {
        let lease_path = self.queue.lease_path();
        if let Some(lease) = WorkerLease::read(&lease_path) {
            if lease.owner_id != self.owner_id {
                return Ok(false);
            }
        }
        WorkerLease::new(self.owner_id).write(&lease_path)?;
        Ok(true)
    }

    /// Delete our own lease on exit, leaving someone else's alone.
    fn release_lease(&self) {
        let lease_path = self.queue.lease_path();
        match WorkerLease::read(&lease_path) {
            Some(lease) if lease.owner_id == self.owner_id => {
                if let Err(err) = WorkerLease::remove(&lease_path) {
                    error!("failed to release worker lease: {err:#}");
                }
            }
            _ => {}
        }
    }
}
