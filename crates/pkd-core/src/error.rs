//! Error taxonomy shared across the pipeline.

use crate::ids::UploadId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input-stage errors surfaced directly to the caller; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Byte-identical content was uploaded before (non-failed record).
    #[error("duplicate upload; existing record {existing}")]
    DuplicateUpload {
        /// Id of the record that already holds this content.
        existing: UploadId,
    },
    /// Neither an LDIF file nor an ICAO master list.
    #[error("unsupported file format: {file_name}")]
    UnsupportedFormat { file_name: String },
    /// Caller-provided checksum disagrees with the computed fingerprint.
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },
    /// Payload exceeds the accepted size.
    #[error("upload of {got} bytes exceeds the {max} byte limit")]
    Oversize { got: u64, max: u64 },
}

/// Outcome of a duplicate probe before persisting an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateStatus {
    /// Content not seen before.
    None,
    /// Byte-identical content already recorded.
    Exact,
    /// Expected checksum disagreed with the computed one.
    ChecksumMismatch,
    /// New content under a file name seen before.
    NewerVersion,
}

/// A single malformed entry recorded during parsing; the scan continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFault {
    /// Zero-based entry index within the source file.
    pub index: usize,
    pub reason: String,
}

/// Per-certificate validation error kinds. Non-fatal to the pipeline;
/// accumulated on the owning row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    SelfSignFailed,
    SignatureInvalid,
    IssuerNotFound,
    Expired,
    InvalidCaConstraints,
    InvalidKeyUsage,
    Revoked,
    NonConformantAttr,
    MasterListUntrustedSigner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_to_wire_names() {
        let k = serde_json::to_string(&ValidationErrorKind::InvalidCaConstraints).unwrap();
        assert_eq!(k, "\"INVALID_CA_CONSTRAINTS\"");
        let k = serde_json::to_string(&ValidationErrorKind::MasterListUntrustedSigner).unwrap();
        assert_eq!(k, "\"MASTER_LIST_UNTRUSTED_SIGNER\"");
    }

    #[test]
    fn upload_error_messages_carry_context() {
        let e = UploadError::Oversize { got: 200, max: 100 };
        assert!(e.to_string().contains("200"));
    }
}
