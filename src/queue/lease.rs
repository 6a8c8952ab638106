use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory liveness record of the queue's worker. It only exists to
/// avoid duplicate polling; `claim`'s atomic rename is what guarantees
/// at-most-once processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLease {
    pub owner_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl WorkerLease {
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            started_at: Utc::now(),
        }
    }

    /// A lease older than the TTL belongs to a crashed worker and may be
    /// reclaimed. Never an error condition.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.started_at);
        // A future timestamp (clock skew) reads as a fresh lease.
        age.to_std().map_or(false, |age| age > ttl)
    }

    /// Read the lease at `path`. A missing file means no worker; an
    /// unparseable file is treated the same way (and logged), since a
    /// corrupt lease must never wedge the queue.
    pub fn read(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("failed to read worker lease {path:?}: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(lease) => Some(lease),
            Err(err) => {
                warn!("discarding corrupt worker lease {path:?}: {err}");
                None
            }
        }
    }

    /// Write via a temp sibling plus rename, the same discipline as queue
    /// records, so a concurrent reader never sees a half-written lease.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("failed to serialize worker lease")?;
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("lease path {path:?} has no parent directory"))?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("lease path {path:?} has no file name"))?;
        let tmp = parent.join(format!(".{file_name}.tmp-{:04x}", rand::random::<u16>()));
        fs::write(&tmp, json).context(format!("failed to write worker lease {tmp:?}"))?;
        fs::rename(&tmp, path).context(format!("failed to move worker lease into place at {path:?}"))
    }

    /// Remove the lease file; already-gone is fine.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(format!("failed to remove worker lease {path:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lease_is_not_stale() {
        let lease = WorkerLease::new(Uuid::new_v4());
        assert!(!lease.is_stale(Duration::from_secs(300)));
    }

    #[test]
    fn old_lease_is_stale() {
        let lease = WorkerLease {
            owner_id: Uuid::new_v4(),
            started_at: Utc::now() - chrono::Duration::seconds(301),
        };
        assert!(lease.is_stale(Duration::from_secs(300)));
    }
}
