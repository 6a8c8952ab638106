use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::DEFAULT_TASK_PRIORITY;

/// The owning entity kinds whose images the pipeline derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Project,
    Service,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Project => "project",
            SubjectKind::Service => "service",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: i64,
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

/// CRUD operation that triggered a derivation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    BulkUpdate,
}

/// What a task does, with its strongly-typed payload. The worker matches
/// this exhaustively; there is no string-keyed dispatch anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskKind {
    Create { subject: SubjectRef },
    Update { subject: SubjectRef },
    BulkUpdate { subject: SubjectRef },
    Cleanup { subject: SubjectRef, stale_path: PathBuf },
}

impl TaskKind {
    pub fn derive(operation: Operation, subject: SubjectRef) -> Self {
        match operation {
            Operation::Create => TaskKind::Create { subject },
            Operation::Update => TaskKind::Update { subject },
            Operation::BulkUpdate => TaskKind::BulkUpdate { subject },
        }
    }

    pub fn subject(&self) -> &SubjectRef {
        match self {
            TaskKind::Create { subject }
            | TaskKind::Update { subject }
            | TaskKind::BulkUpdate { subject }
            | TaskKind::Cleanup { subject, .. } => subject,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Create { .. } => "create",
            TaskKind::Update { .. } => "update",
            TaskKind::BulkUpdate { .. } => "bulk_update",
            TaskKind::Cleanup { .. } => "cleanup",
        }
    }
}

/// One unit of background work. The payload is immutable once enqueued;
/// only `attempts` and `last_error` are touched, by the retry policy and
/// dead-lettering respectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Name of the quality preset to derive under.
    pub policy: String,
    pub enqueued_at: DateTime<Utc>,
    pub priority: u8,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(kind: TaskKind, policy: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            policy: policy.into(),
            enqueued_at: Utc::now(),
            priority: DEFAULT_TASK_PRIORITY,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// A pending task as listed from durable storage. `file_name` is the
/// queue-ordering key: priority bucket, then enqueue time, then a random
/// tie-break suffix.
#[derive(Debug, Clone)]
pub struct QueueRecord {
    pub file_name: String,
    pub task: Task,
}

/// A record relocated to the in-flight area for the duration of handling.
/// If the process dies mid-handling it stays there for inspection.
#[derive(Debug)]
pub struct InFlightRecord {
    pub file_name: String,
    pub path: PathBuf,
    pub task: Task,
}
