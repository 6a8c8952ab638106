//! Durable, directory-backed FIFO-ish task queue.
//!
//! Layout under one queue root:
//!
//! ```text
//! <root>/pending/*.json       one file per pending task, name = ordering key
//! <root>/in-flight/*.json     records currently being handled
//! <root>/in-flight/failed_*   dead letters, never auto-requeued
//! <root>/worker.lease         advisory worker liveness record
//! ```
//!
//! All coordination is atomic rename; there is no read-modify-write
//! anywhere. `claim` moving a record from pending to in-flight is the
//! sole at-most-once guarantee — the lease only trims duplicate polling.

pub mod lease;
pub mod record;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

use crate::common::{DEAD_LETTER_PREFIX, LEASE_FILE_NAME};
use crate::queue::lease::WorkerLease;
use crate::queue::record::{InFlightRecord, QueueRecord, Task};

/// Operator-facing snapshot of a queue root.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub in_flight: usize,
    pub dead_letter: usize,
    pub worker_alive: bool,
}

/// Outcome of trying to claim a pending record.
#[derive(Debug)]
pub enum Claim {
    Claimed(InFlightRecord),
    /// Another worker renamed the record away first. Not an error.
    AlreadyClaimed,
}

pub struct TaskQueue {
    root: PathBuf,
}

impl TaskQueue {
    /// Open (and lay out) the queue at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let queue = Self { root: root.into() };
        fs::create_dir_all(queue.pending_dir())
            .context("failed to create pending area")?;
        fs::create_dir_all(queue.in_flight_dir())
            .context("failed to create in-flight area")?;
        Ok(queue)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    pub fn in_flight_dir(&self) -> PathBuf {
        self.root.join("in-flight")
    }

    pub fn lease_path(&self) -> PathBuf {
        self.root.join(LEASE_FILE_NAME)
    }

    /// Persist a task as one pending record. This is a small metadata
    /// write only — image bytes are never touched here, so calling it
    /// from a request path is cheap.
    pub fn enqueue(&self, task: &Task) -> Result<QueueRecord> {
        // Priority is zero-padded to the full u8 width so lexicographic
        // listing order matches numeric order.
        let file_name = format!(
            "{:03}-{:013}-{:04x}.json",
            task.priority,
            task.enqueued_at.timestamp_millis(),
            rand::random::<u16>(),
        );
        let path = self.pending_dir().join(&file_name);
        write_record(&path, task)?;
        Ok(QueueRecord {
            file_name,
            task: task.clone(),
        })
    }

    /// List pending records, oldest first within each priority bucket.
    /// A record that cannot be read this poll (mid-rename, transient I/O)
    /// is skipped and simply stays pending for the next poll.
    pub fn peek_all(&self) -> Result<Vec<QueueRecord>> {
        let mut names: Vec<String> = fs::read_dir(self.pending_dir())
            .context("failed to list pending area")?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".json") && !name.starts_with('.'))
            .collect();
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for file_name in names {
            let path = self.pending_dir().join(&file_name);
            match read_task(&path) {
                Ok(task) => records.push(QueueRecord { file_name, task }),
                Err(err) => warn!("skipping unreadable pending record {file_name}: {err:#}"),
            }
        }
        Ok(records)
    }

    /// Atomically move a pending record into the in-flight area. Exactly
    /// one of any number of racing claimants wins; the others observe
    /// `AlreadyClaimed`.
    pub fn claim(&self, record: &QueueRecord) -> Result<Claim> {
        let from = self.pending_dir().join(&record.file_name);
        let to = self.in_flight_dir().join(&record.file_name);
        match fs::rename(&from, &to) {
            Ok(()) => Ok(Claim::Claimed(InFlightRecord {
                file_name: record.file_name.clone(),
                path: to,
                task: record.task.clone(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Claim::AlreadyClaimed),
            Err(err) => {
                Err(err).context(format!("failed to claim record {}", record.file_name))
            }
        }
    }

    /// Handler succeeded: the task is consumed and its record destroyed.
    pub fn complete(&self, in_flight: InFlightRecord) -> Result<()> {
        fs::remove_file(&in_flight.path).context(format!(
            "failed to remove completed record {}",
            in_flight.file_name
        ))
    }

    /// Put a record back into the pending area with its attempt counter
    /// bumped, keeping its original ordering key so same-subject order
    /// is preserved.
    pub fn retry(&self, mut in_flight: InFlightRecord, reason: &str) -> Result<()> {
        in_flight.task.attempts += 1;
        in_flight.task.last_error = Some(reason.to_string());
        let pending = self.pending_dir().join(&in_flight.file_name);
        write_record(&pending, &in_flight.task)?;
        fs::remove_file(&in_flight.path).context(format!(
            "failed to remove in-flight record {} after requeue",
            in_flight.file_name
        ))
    }

    /// Handler failed fatally: relocate to the dead-letter namespace with
    /// the error text embedded for offline diagnosis. Never auto-requeued.
    pub fn fail(&self, mut in_flight: InFlightRecord, reason: &str) -> Result<()> {
        in_flight.task.attempts += 1;
        in_flight.task.last_error = Some(reason.to_string());
        let dead = self
            .in_flight_dir()
            .join(format!("{DEAD_LETTER_PREFIX}{}", in_flight.file_name));
        write_record(&dead, &in_flight.task)?;
        fs::remove_file(&in_flight.path).context(format!(
            "failed to remove in-flight record {} after dead-lettering",
            in_flight.file_name
        ))
    }

    /// List dead-lettered records, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<QueueRecord>> {
        let mut names: Vec<String> = fs::read_dir(self.in_flight_dir())
            .context("failed to list in-flight area")?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(DEAD_LETTER_PREFIX))
            .collect();
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for file_name in names {
            let path = self.in_flight_dir().join(&file_name);
            match read_task(&path) {
                Ok(task) => records.push(QueueRecord { file_name, task }),
                Err(err) => warn!("skipping unreadable dead letter {file_name}: {err:#}"),
            }
        }
        Ok(records)
    }

    pub fn status(&self, lease_ttl: Duration) -> Result<QueueStatus> {
        let pending = count_entries(&self.pending_dir(), |name| {
            name.ends_with(".json") && !name.starts_with('.')
        })?;
        let dead_letter = count_entries(&self.in_flight_dir(), |name| {
            name.starts_with(DEAD_LETTER_PREFIX)
        })?;
        let in_flight = count_entries(&self.in_flight_dir(), |name| {
            name.ends_with(".json") && !name.starts_with(DEAD_LETTER_PREFIX) && !name.starts_with('.')
        })?;
        let worker_alive = WorkerLease::read(&self.lease_path())
            .map(|lease| !lease.is_stale(lease_ttl))
            .unwrap_or(false);
        Ok(QueueStatus {
            pending,
            in_flight,
            dead_letter,
            worker_alive,
        })
    }
}

/// Serialize a task to `path` via temp sibling + rename, so a concurrent
/// lister never sees a half-written record.
fn write_record(path: &Path, task: &Task) -> Result<()> {
    let parent = path.parent().expect("record path always has a parent");
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .expect("record path always has a utf-8 file name");
    let tmp = parent.join(format!(".{file_name}.tmp-{:04x}", rand::random::<u16>()));

    let json = serde_json::to_vec_pretty(task).context("failed to serialize task record")?;
    fs::write(&tmp, json).context(format!("failed to write record {tmp:?}"))?;
    fs::rename(&tmp, path).context(format!("failed to move record into place at {path:?}"))
}

fn read_task(path: &Path) -> Result<Task> {
    let bytes = fs::read(path).context(format!("failed to read record {path:?}"))?;
    serde_json::from_slice(&bytes).context(format!("failed to parse record {path:?}"))
}

fn count_entries(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<usize> {
    Ok(fs::read_dir(dir)
        .context(format!("failed to list {dir:?}"))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| keep(name))
        .count())
}
