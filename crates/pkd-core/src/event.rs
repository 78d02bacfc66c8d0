//! Domain events exchanged between pipeline stages.
//!
//! Events are published only after the producing transaction commits;
//! handlers re-read their aggregates by id rather than holding captured
//! references across the thread boundary.

use crate::entity::ProcessingMode;
use crate::ids::UploadId;
use crate::value::{CertData, CrlData, MasterListEnvelope};

/// Running counters surfaced with stage-completion events and progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageCounts {
    pub certificates_total: usize,
    pub certificates_valid: usize,
    pub certificates_invalid: usize,
    pub crls_total: usize,
    pub published: usize,
    pub duplicates_skipped: usize,
    pub publish_failures: usize,
}

/// One in-process domain event.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// An upload record was committed with status `RECEIVED`.
    FileUploaded { upload_id: UploadId, mode: ProcessingMode },
    /// Parsing finished; extracted items travel as value objects.
    ParsingCompleted {
        upload_id: UploadId,
        mode: ProcessingMode,
        certs: Vec<CertData>,
        crls: Vec<CrlData>,
        master_list: Option<MasterListEnvelope>,
    },
    /// Validation (and the interleaved publication) finished.
    ValidationCompleted { upload_id: UploadId, mode: ProcessingMode, counts: StageCounts },
    /// A stage failed; the upload record has transitioned to `FAILED`.
    UploadFailed { upload_id: UploadId, stage: &'static str, message: String },
}

impl DomainEvent {
    /// The upload this event belongs to.
    pub fn upload_id(&self) -> UploadId {
        match self {
            DomainEvent::FileUploaded { upload_id, .. }
            | DomainEvent::ParsingCompleted { upload_id, .. }
            | DomainEvent::ValidationCompleted { upload_id, .. }
            | DomainEvent::UploadFailed { upload_id, .. } => *upload_id,
        }
    }

    /// Short name for spans and logs.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::FileUploaded { .. } => "file_uploaded",
            DomainEvent::ParsingCompleted { .. } => "parsing_completed",
            DomainEvent::ValidationCompleted { .. } => "validation_completed",
            DomainEvent::UploadFailed { .. } => "upload_failed",
        }
    }
}
