//! Pre-computes web-ready derivatives (multiple sizes, multiple formats)
//! for uploaded images, off the critical path of the request that
//! accepted the upload.
//!
//! The caller persists the original synchronously, calls
//! [`Pipeline::queue_derivation`], and returns immediately; a durable
//! directory-backed queue plus an effectively-single background worker do
//! the decoding, resizing, and encoding later. Derivative locations are a
//! pure function of the source path, so consumers can look them up (and
//! fall back to the original) without any extra bookkeeping.

pub mod common;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod presets;
pub mod queue;
pub mod resolve;
pub mod worker;

pub use common::errors::HandlerError;
pub use config::{PipelineConfig, RetryPolicy};
pub use engine::{DerivationEngine, DerivativeSet, Variant};
pub use pipeline::Pipeline;
pub use presets::{OutputFormat, QualityPreset, SizeBox, SizeTag};
pub use queue::record::{Operation, SubjectKind, SubjectRef, Task, TaskKind};
pub use queue::{Claim, QueueStatus, TaskQueue};
pub use worker::{ManifestSubjectStore, SubjectStore, Worker};
pub use worker::supervisor::WorkerSupervisor;
