use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use crate::common::errors::handle_error;
use crate::config::PipelineConfig;
use crate::presets::{OutputFormat, SizeTag};
use crate::queue::record::{Operation, SubjectKind, SubjectRef, Task, TaskKind};
use crate::queue::{QueueStatus, TaskQueue};
use crate::resolve;
use crate::worker::SubjectStore;
use crate::worker::supervisor::WorkerSupervisor;

/// Facade the CRUD layer talks to. All collaborators are constructor
/// supplied; there is no ambient global state to disconnect around.
///
/// The enqueue methods are fire-and-forget: they absorb and log every
/// error, so they are safe to call from a post-commit hook.
pub struct Pipeline {
    queue: Arc<TaskQueue>,
    supervisor: WorkerSupervisor,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(
        queue_root: impl Into<PathBuf>,
        subjects: Arc<dyn SubjectStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let queue = Arc::new(TaskQueue::open(queue_root).context("failed to open task queue")?);
        let supervisor = WorkerSupervisor::new(queue.clone(), subjects, config.clone());
        Ok(Self {
            queue,
            supervisor,
            config,
        })
    }

    /// Request derivatives for a subject's current original image.
    pub fn queue_derivation(&self, kind: SubjectKind, id: i64, operation: Operation) {
        let subject = SubjectRef { kind, id };
        let task = Task::new(
            TaskKind::derive(operation, subject),
            &self.config.default_policy,
        );
        if let Err(err) = self.submit(task) {
            let _ = handle_error(err.context(format!("failed to queue derivation for {subject}")));
        }
    }

    /// Request removal of the derivative namespace of a path the subject
    /// no longer uses.
    pub fn queue_cleanup(&self, kind: SubjectKind, id: i64, stale_path: impl Into<PathBuf>) {
        let subject = SubjectRef { kind, id };
        let task = Task::new(
            TaskKind::Cleanup {
                subject,
                stale_path: stale_path.into(),
            },
            &self.config.default_policy,
        );
        if let Err(err) = self.submit(task) {
            let _ = handle_error(err.context(format!("failed to queue cleanup for {subject}")));
        }
    }

    fn submit(&self, task: Task) -> Result<()> {
        let record = self.queue.enqueue(&task)?;
        debug!("enqueued task {} as {}", task.id, record.file_name);
        self.supervisor.ensure_worker_running()?;
        Ok(())
    }

    pub fn queue_status(&self) -> Result<QueueStatus> {
        self.queue.status(self.config.lease_ttl())
    }

    /// Where a consumer should load the derivative from, degrading to the
    /// original when the derivative has not been computed (yet, or ever).
    pub fn derivative_or_original(
        &self,
        source: &Path,
        tag: SizeTag,
        format: OutputFormat,
    ) -> PathBuf {
        let path = resolve::derivative_path(source, tag, format);
        if path.is_file() {
            path
        } else {
            source.to_path_buf()
        }
    }
}
