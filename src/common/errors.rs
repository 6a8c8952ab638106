use std::path::PathBuf;

use thiserror::Error;

/// Classification of a task handler's outcome, matched by the worker to
/// decide between complete, retry, and dead-letter.
///
/// Per-variant encode failures never reach this level; the engine absorbs
/// them so the rest of the derivative set still completes.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The referenced entity was deleted before the task ran. Treated as a
    /// successful no-op, never dead-lettered.
    #[error("subject no longer exists: {0}")]
    SubjectGone(String),

    /// The source bytes could not be decoded at all. Needs operator
    /// attention; the task moves to the dead-letter area.
    #[error("source image unreadable: {path:?}")]
    FatalDecode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Anything else fatal to this task (missing source file, namespace
    /// deletion I/O failure, ...).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Log an absorbed error with its full context chain and hand it back,
/// so fire-and-forget call sites stay one-liners.
pub fn handle_error(err: anyhow::Error) -> anyhow::Error {
    log::error!("{err:?}");
    err
}
