pub mod errors;

/// A lease older than this is treated as left behind by a crashed worker.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 300;

/// How long the worker sleeps between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

/// The worker exits once the queue has stayed empty for this long.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;

/// Base delay between retry attempts; multiplied by the attempt number.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Presets at or above this quality that ask for lossless encoding get it.
pub const LOSSLESS_QUALITY_THRESHOLD: u8 = 95;

/// Directory suffix for the per-source derivative namespace.
pub const DERIVATIVE_NAMESPACE_SUFFIX: &str = ".drv";

/// File name of the advisory worker lease inside a queue root.
pub const LEASE_FILE_NAME: &str = "worker.lease";

/// Prefix marking a dead-lettered record in the in-flight area.
pub const DEAD_LETTER_PREFIX: &str = "failed_";

pub const DEFAULT_TASK_PRIORITY: u8 = 10;
