use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::queue::TaskQueue;
use crate::queue::lease::WorkerLease;
use crate::worker::{SubjectStore, Worker};

/// Keeps at most one effectively-active worker per queue root, reclaiming
/// leases left behind by crashed workers.
///
/// Check-then-write on the lease is not atomic across processes, so two
/// workers can rarely start together. That only wastes polling; `claim`'s
/// atomic rename still prevents any record from being processed twice.
pub struct WorkerSupervisor {
    queue: Arc<TaskQueue>,
    subjects: Arc<dyn SubjectStore>,
    config: Arc<PipelineConfig>,
}

impl WorkerSupervisor {
    pub fn new(
        queue: Arc<TaskQueue>,
        subjects: Arc<dyn SubjectStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            queue,
            subjects,
            config,
        }
    }

    /// Idempotent; invoked on every enqueue. Returns whether a worker was
    /// actually spawned.
    pub fn ensure_worker_running(&self) -> Result<bool> {
        let lease_path = self.queue.lease_path();
        match WorkerLease::read(&lease_path) {
            Some(lease) if !lease.is_stale(self.config.lease_ttl()) => return Ok(false),
            Some(lease) => {
                warn!(
                    "reclaiming stale worker lease {} (started {})",
                    lease.owner_id, lease.started_at
                );
                WorkerLease::remove(&lease_path)?;
            }
            None => {}
        }

        let owner_id = Uuid::new_v4();
        WorkerLease::new(owner_id).write(&lease_path)?;

        let worker = Worker::new(
            self.queue.clone(),
            self.subjects.clone(),
            self.config.clone(),
            owner_id,
        );
        thread::Builder::new()
            .name("pixelmill-worker".to_string())
            .spawn(move || worker.run())
            .context("failed to spawn worker thread")?;
        info!("started worker {owner_id} for queue {:?}", self.queue.root());
        Ok(true)
    }
}
