//! The staged processing pipeline.
//!
//! Upload → Parsing → Validation → Publication, driven by domain
//! events. AUTO mode chains stages on the event worker pool; MANUAL
//! mode pauses after each stage until an operator advances it. The
//! validation stage interleaves database batches with LDAP batches in
//! one deterministic sequence.

#![deny(unsafe_code)]

pub mod parse;
pub mod service;
pub mod upload;
pub mod validate;

use pkd_core::{UploadError, UploadId};
use thiserror::Error;

pub use service::{PipelineService, StatusView};
pub use upload::{UploadReceipt, UploadRequest};

/// Tunables, with deployment-contract defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Uploads larger than this are rejected outright.
    pub max_upload_bytes: u64,
    /// Certificates per DB/LDAP batch.
    pub batch_size: usize,
    /// Event queue capacity (the backpressure bound).
    pub queue_capacity: usize,
    /// Event worker pool width.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            batch_size: 100,
            queue_capacity: events::DEFAULT_CAPACITY,
            workers: events::DEFAULT_WORKERS,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden from the environment (`PKD_BATCH_SIZE`,
    /// `PKD_MAX_UPLOAD_BYTES`, `PKD_EVENT_WORKERS`).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_usize("PKD_BATCH_SIZE") {
            cfg.batch_size = v.max(1);
        }
        if let Some(v) = env_usize("PKD_MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = v as u64;
        }
        if let Some(v) = env_usize("PKD_EVENT_WORKERS") {
            cfg.workers = v.max(1);
        }
        cfg
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Pipeline-level failures (stage-fatal; per-item faults are recorded
/// on the owning entities instead).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("parse produced no items")]
    ParseEmpty,
    #[error("malformed input: {0}")]
    Pki(#[from] pki::PkiError),
    #[error(transparent)]
    Bus(#[from] events::BusClosed),
    #[error("upload {0} has no stashed content")]
    MissingContent(UploadId),
    #[error("stage not available: {0}")]
    Gate(String),
}
