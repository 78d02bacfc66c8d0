//! Persisted domain entities and the per-upload state machine.

use crate::error::ValidationErrorKind;
use crate::fingerprint::Fingerprint;
use crate::ids::{CertificateId, CrlId, MasterListId, UploadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an upload moves through the pipeline once received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingMode {
    /// Each stage's completion triggers the next.
    Auto,
    /// Each stage pauses until an operator advances it.
    Manual,
}

/// Pipeline position of an upload record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Received,
    Parsing,
    Validating,
    Publishing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Whether `next` is a legal forward transition from `self`.
    ///
    /// Status advances monotonically; `Failed` is reachable from any
    /// non-terminal state and is terminal.
    pub fn can_advance_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (Received, Parsing)
            | (Parsing, Validating)
            | (Validating, Publishing)
            | (Publishing, Completed) => true,
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

/// Marker recorded when a MANUAL upload pauses after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseStep {
    UploadCompleted,
    ParsingCompleted,
    ValidationCompleted,
}

/// File format accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    Ldif,
    MasterList,
}

/// An upload and its processing history. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: UploadId,
    pub file_name: String,
    pub byte_size: u64,
    /// SHA-256 of the raw bytes; unique across non-failed records.
    pub content_fingerprint: Fingerprint,
    pub detected_format: FileFormat,
    pub mode: ProcessingMode,
    pub manual_pause_step: Option<PauseStep>,
    pub status: UploadStatus,
    /// Per-entry parse faults accumulated without failing the stage.
    pub parse_faults: Vec<crate::error::ParseFault>,
    /// Upload-level validation notes (e.g. untrusted master list signer).
    pub notes: BTreeSet<ValidationErrorKind>,
    /// Populated when `status == Failed`.
    pub failure_message: Option<String>,
    pub created_ms: u64,
    pub updated_ms: u64,
}

impl UploadRecord {
    /// A MANUAL upload paused right after this step can be advanced.
    pub fn paused_at(&self, step: PauseStep) -> bool {
        self.mode == ProcessingMode::Manual && self.manual_pause_step == Some(step)
    }
}

/// Certificate classification inside the PKD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertKind {
    /// Country Signing CA (self-signed national root).
    Csca,
    /// Document Signer Certificate.
    Dsc,
    /// Non-conformant DSC (structurally deviant, signature may be valid).
    DscNc,
}

/// Where a certificate row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Ldif,
    MasterList,
}

/// Validation outcome recorded on a certificate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Invalid,
    Expired,
}

/// A certificate extracted from an upload, persisted during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: CertificateId,
    pub upload_id: UploadId,
    pub kind: CertKind,
    pub source: SourceType,
    /// Normalized subject DN.
    pub subject_dn: String,
    /// Normalized issuer DN.
    pub issuer_dn: String,
    /// Uppercase hex serial number.
    pub serial_hex: String,
    pub subject_country: Option<String>,
    pub issuer_country: Option<String>,
    /// Validity window, seconds since epoch.
    pub not_before: i64,
    pub not_after: i64,
    /// SHA-256 over the DER bytes; unique.
    pub fingerprint_sha256: Fingerprint,
    #[serde(with = "serde_bytes_hex")]
    pub der: Vec<u8>,
    pub validation: ValidationStatus,
    pub errors: BTreeSet<ValidationErrorKind>,
    pub uploaded_to_ldap: bool,
    pub created_ms: u64,
}

/// A certificate revocation list extracted from an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlRecord {
    pub id: CrlId,
    pub upload_id: UploadId,
    /// Normalized issuer DN.
    pub issuer_dn: String,
    pub issuer_country: Option<String>,
    /// Seconds since epoch.
    pub this_update: i64,
    /// `None` when the CRL carries no nextUpdate.
    pub next_update: Option<i64>,
    pub revoked_count: usize,
    pub fingerprint_sha256: Fingerprint,
    #[serde(with = "serde_bytes_hex")]
    pub der: Vec<u8>,
    pub uploaded_to_ldap: bool,
    pub created_ms: u64,
}

/// The signed Master List container, kept whole for republication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterListRecord {
    pub id: MasterListId,
    pub upload_id: UploadId,
    pub signer_country: Option<String>,
    pub contained_csca_count: usize,
    #[serde(with = "serde_bytes_hex")]
    pub raw_cms: Vec<u8>,
    pub uploaded_to_ldap: bool,
    pub created_ms: u64,
}

mod serde_bytes_hex {
    //! Binary columns serialize as lowercase hex; readable in JSON dumps
    //! and stable for golden files.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_monotonic() {
        use UploadStatus::*;
        assert!(Received.can_advance_to(Parsing));
        assert!(Parsing.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Publishing));
        assert!(Publishing.can_advance_to(Completed));
        assert!(!Validating.can_advance_to(Parsing));
        assert!(!Received.can_advance_to(Validating));
    }

    #[test]
    fn failed_is_reachable_and_terminal() {
        use UploadStatus::*;
        for s in [Received, Parsing, Validating, Publishing] {
            assert!(s.can_advance_to(Failed));
        }
        assert!(!Failed.can_advance_to(Parsing));
        assert!(!Completed.can_advance_to(Failed));
    }

    #[test]
    fn wire_names_are_screaming() {
        let s = serde_json::to_string(&UploadStatus::Validating).unwrap();
        assert_eq!(s, "\"VALIDATING\"");
        let k = serde_json::to_string(&CertKind::DscNc).unwrap();
        assert_eq!(k, "\"DSC_NC\"");
        let src = serde_json::to_string(&SourceType::MasterList).unwrap();
        assert_eq!(src, "\"MASTER_LIST\"");
    }
}
