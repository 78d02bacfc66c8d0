//! PKD core primitives and shared domain types.
//!
//! Everything in here is transport- and storage-agnostic: identifiers,
//! the entities the pipeline persists, the value objects parsers emit,
//! the validation-error taxonomy, and the two process-wide string helpers
//! (DN normalization and country extraction) every other crate goes
//! through.

#![deny(unsafe_code)]

pub mod dn;
pub mod entity;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod format;
pub mod ids;
pub mod value;

pub use entity::{
    CertKind, CertificateRecord, CrlRecord, FileFormat, MasterListRecord, PauseStep,
    ProcessingMode, SourceType, UploadRecord, UploadStatus, ValidationStatus,
};
pub use error::{DuplicateStatus, ParseFault, UploadError, ValidationErrorKind};
pub use event::{DomainEvent, StageCounts};
pub use fingerprint::Fingerprint;
pub use ids::{CertificateId, CrlId, MasterListId, UploadId};

/// Version of the PKD core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
