//! Upload intake: fingerprint, dedup, format detection.

use crate::{PipelineConfig, PipelineError};
use pkd_core::{
    format, DomainEvent, DuplicateStatus, FileFormat, Fingerprint, ProcessingMode, UploadError,
    UploadId, UploadRecord, UploadStatus,
};
use store::{with_txn, Store};
use tracing::info;

/// One incoming file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Caller-claimed SHA-256 (hex); mismatch rejects the upload.
    pub expected_checksum: Option<String>,
    pub mode: ProcessingMode,
    /// Accept content whose fingerprint is already recorded.
    pub force_override: bool,
}

/// What the caller gets back on acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub upload_id: UploadId,
    pub duplicate_status: DuplicateStatus,
    pub detected_format: FileFormat,
}

/// Probe outcome for the given fingerprint and file name.
pub fn check_duplicate<S: Store>(
    store: &S,
    fingerprint: &Fingerprint,
    expected_checksum: Option<&str>,
    file_name: &str,
) -> DuplicateStatus {
    if let Some(expected) = expected_checksum {
        if !expected.eq_ignore_ascii_case(&fingerprint.to_hex()) {
            return DuplicateStatus::ChecksumMismatch;
        }
    }
    if store.find_upload_by_fingerprint(fingerprint).is_some() {
        return DuplicateStatus::Exact;
    }
    if store.find_upload_by_file_name(file_name).is_some() {
        return DuplicateStatus::NewerVersion;
    }
    DuplicateStatus::None
}

/// Validate, dedup, persist the upload record, and return the events to
/// publish after commit.
pub(crate) fn accept<S: Store>(
    store: &S,
    config: &PipelineConfig,
    req: &UploadRequest,
) -> Result<(UploadReceipt, Vec<DomainEvent>), PipelineError> {
    if req.bytes.len() as u64 > config.max_upload_bytes {
        return Err(UploadError::Oversize {
            got: req.bytes.len() as u64,
            max: config.max_upload_bytes,
        }
        .into());
    }
    let fingerprint = Fingerprint::of(&req.bytes);
    if let Some(expected) = &req.expected_checksum {
        if !expected.eq_ignore_ascii_case(&fingerprint.to_hex()) {
            return Err(UploadError::ChecksumMismatch {
                expected: expected.clone(),
                computed: fingerprint.to_hex(),
            }
            .into());
        }
    }
    let duplicate_status = check_duplicate(store, &fingerprint, None, &req.file_name);
    if duplicate_status == DuplicateStatus::Exact && !req.force_override {
        let existing = store
            .find_upload_by_fingerprint(&fingerprint)
            .map(|r| r.id)
            .unwrap_or_else(UploadId::new);
        return Err(UploadError::DuplicateUpload { existing }.into());
    }
    let detected_format = format::detect(&req.file_name, &req.bytes).ok_or_else(|| {
        UploadError::UnsupportedFormat { file_name: req.file_name.clone() }
    })?;

    let now = pkd_core::ids::now_ms();
    let record = UploadRecord {
        id: UploadId::new(),
        file_name: req.file_name.clone(),
        byte_size: req.bytes.len() as u64,
        content_fingerprint: fingerprint,
        detected_format,
        mode: req.mode,
        manual_pause_step: None,
        status: UploadStatus::Received,
        parse_faults: Vec::new(),
        notes: Default::default(),
        failure_message: None,
        created_ms: now,
        updated_ms: now,
    };
    let upload_id = record.id;
    let ((), events) = with_txn(store, |txn| {
        txn.store.insert_upload(record);
        txn.publish(DomainEvent::FileUploaded { upload_id, mode: req.mode });
        Ok::<_, PipelineError>(())
    })?;
    info!(upload = %upload_id, file = %req.file_name, format = ?detected_format, "upload accepted");
    Ok((UploadReceipt { upload_id, duplicate_status, detected_format }, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    fn req(bytes: &[u8]) -> UploadRequest {
        UploadRequest {
            file_name: "icaopkd-002-dsccrl-000001.ldif".into(),
            bytes: bytes.to_vec(),
            expected_checksum: None,
            mode: ProcessingMode::Auto,
            force_override: false,
        }
    }

    const LDIF: &[u8] = b"dn: o=dsc,c=UT\nobjectClass: organization\n";

    #[test]
    fn accepts_and_emits_file_uploaded() {
        let store = InMemoryStore::new();
        let (receipt, events) = accept(&store, &PipelineConfig::default(), &req(LDIF)).unwrap();
        assert_eq!(receipt.duplicate_status, DuplicateStatus::None);
        assert_eq!(receipt.detected_format, FileFormat::Ldif);
        assert_eq!(events.len(), 1);
        assert!(store.upload(receipt.upload_id).is_some());
    }

    #[test]
    fn second_identical_upload_is_a_duplicate() {
        let store = InMemoryStore::new();
        let cfg = PipelineConfig::default();
        let (first, _) = accept(&store, &cfg, &req(LDIF)).unwrap();
        let err = accept(&store, &cfg, &req(LDIF)).unwrap_err();
        match err {
            PipelineError::Upload(UploadError::DuplicateUpload { existing }) => {
                assert_eq!(existing, first.upload_id);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn force_override_reports_exact() {
        let store = InMemoryStore::new();
        let cfg = PipelineConfig::default();
        accept(&store, &cfg, &req(LDIF)).unwrap();
        let mut r = req(LDIF);
        r.force_override = true;
        let (receipt, _) = accept(&store, &cfg, &r).unwrap();
        assert_eq!(receipt.duplicate_status, DuplicateStatus::Exact);
    }

    #[test]
    fn checksum_mismatch_persists_nothing() {
        let store = InMemoryStore::new();
        let mut r = req(LDIF);
        r.expected_checksum = Some("00".repeat(32));
        let err = accept(&store, &PipelineConfig::default(), &r).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upload(UploadError::ChecksumMismatch { .. })
        ));
        assert_eq!(store.certificate_count(), 0);
        assert!(store.find_upload_by_file_name(&r.file_name).is_none());
    }

    #[test]
    fn matching_checksum_is_accepted() {
        let store = InMemoryStore::new();
        let mut r = req(LDIF);
        r.expected_checksum = Some(Fingerprint::of(LDIF).to_hex().to_uppercase());
        accept(&store, &PipelineConfig::default(), &r).unwrap();
    }

    #[test]
    fn oversize_and_unknown_format_rejected() {
        let store = InMemoryStore::new();
        let mut cfg = PipelineConfig::default();
        cfg.max_upload_bytes = 4;
        let err = accept(&store, &cfg, &req(LDIF)).unwrap_err();
        assert!(matches!(err, PipelineError::Upload(UploadError::Oversize { .. })));

        let mut r = req(&[0x30, 0x82]);
        r.file_name = "blob.bin".into();
        let err = accept(&store, &PipelineConfig::default(), &r).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upload(UploadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn same_name_new_content_is_newer_version() {
        let store = InMemoryStore::new();
        let cfg = PipelineConfig::default();
        accept(&store, &cfg, &req(LDIF)).unwrap();
        let (receipt, _) =
            accept(&store, &cfg, &req(b"dn: o=csca,c=UT\nobjectClass: organization\n")).unwrap();
        assert_eq!(receipt.duplicate_status, DuplicateStatus::NewerVersion);
    }
}
