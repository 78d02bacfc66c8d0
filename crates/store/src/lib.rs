//! Repository contracts plus a concurrent in-memory implementation.
//!
//! The relational engine is an external collaborator; this crate pins
//! down its interface: unique indexes on upload and certificate
//! fingerprints, idempotent upserts, and lookups the validation pass
//! needs (CSCA by subject DN, CRLs by issuer DN).
//!
//! [`with_txn`] is the unit-of-work boundary. Domain events queued
//! inside the closure are *returned* only when it succeeds, so callers
//! publish strictly after commit; on error they are discarded. No event
//! ever escapes a failed transaction.

#![deny(unsafe_code)]

use dashmap::DashMap;
use pkd_core::{
    CertKind, CertificateId, CertificateRecord, CrlId, CrlRecord, DomainEvent, Fingerprint,
    MasterListId, MasterListRecord, UploadId, UploadRecord, UploadStatus,
};
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload {0} not found")]
    UploadNotFound(UploadId),
    #[error("certificate {0} not found")]
    CertificateNotFound(CertificateId),
    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalTransition { from: UploadStatus, to: UploadStatus },
}

/// Outcome of an idempotent insert keyed by a unique fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome<I> {
    /// Row written for the first time.
    Inserted(I),
    /// A row with the same fingerprint already exists; nothing written.
    Skipped(I),
}

impl<I: Copy> UpsertOutcome<I> {
    /// The id of the row holding this content, new or pre-existing.
    pub fn id(&self) -> I {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Skipped(id) => *id,
        }
    }

    /// True when this call created the row.
    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

/// The persistence contract the pipeline is written against.
pub trait Store: Send + Sync + 'static {
    /// Persist a fresh upload record.
    fn insert_upload(&self, rec: UploadRecord);
    /// Fetch an upload by id.
    fn upload(&self, id: UploadId) -> Option<UploadRecord>;
    /// Unique-index lookup; failed records do not count as occupants.
    fn find_upload_by_fingerprint(&self, fp: &Fingerprint) -> Option<UploadRecord>;
    /// Most recent upload with this file name, if any.
    fn find_upload_by_file_name(&self, file_name: &str) -> Option<UploadRecord>;
    /// Read-modify-write an upload record.
    fn update_upload(
        &self,
        id: UploadId,
        f: &mut dyn FnMut(&mut UploadRecord),
    ) -> Result<(), StoreError>;
    /// Advance the status, enforcing the monotonic state machine.
    fn advance_upload_status(&self, id: UploadId, to: UploadStatus) -> Result<(), StoreError>;

    /// Idempotent insert keyed by `fingerprint_sha256`.
    fn upsert_certificate(&self, rec: CertificateRecord) -> UpsertOutcome<CertificateId>;
    /// Fetch a certificate by id.
    fn certificate(&self, id: CertificateId) -> Option<CertificateRecord>;
    /// Read-modify-write a certificate row.
    fn update_certificate(
        &self,
        id: CertificateId,
        f: &mut dyn FnMut(&mut CertificateRecord),
    ) -> Result<(), StoreError>;
    /// First stored CSCA whose normalized subject equals `subject_dn`.
    fn find_csca_by_subject(&self, subject_dn: &str) -> Option<CertificateRecord>;
    /// All certificate rows owned by an upload.
    fn certificates_for_upload(&self, upload_id: UploadId) -> Vec<CertificateRecord>;
    /// Total certificate rows (test and report surface).
    fn certificate_count(&self) -> usize;

    /// Idempotent insert keyed by the CRL fingerprint.
    fn upsert_crl(&self, rec: CrlRecord) -> UpsertOutcome<CrlId>;
    /// Read-modify-write a CRL row.
    fn update_crl(&self, id: CrlId, f: &mut dyn FnMut(&mut CrlRecord)) -> Result<(), StoreError>;
    /// CRLs whose normalized issuer equals `issuer_dn`.
    fn find_crls_by_issuer(&self, issuer_dn: &str) -> Vec<CrlRecord>;
    /// All CRL rows owned by an upload.
    fn crls_for_upload(&self, upload_id: UploadId) -> Vec<CrlRecord>;

    /// Persist the master list envelope for an upload.
    fn insert_master_list(&self, rec: MasterListRecord) -> MasterListId;
    /// Read-modify-write a master list row.
    fn update_master_list(
        &self,
        id: MasterListId,
        f: &mut dyn FnMut(&mut MasterListRecord),
    ) -> Result<(), StoreError>;
    /// The master list row of an upload, if that upload was one.
    fn master_list_for_upload(&self, upload_id: UploadId) -> Option<MasterListRecord>;
}

/// Unit of work: mutations go to the store, events are buffered.
pub struct Txn<'a, S: Store + ?Sized> {
    /// The store the transaction writes through.
    pub store: &'a S,
    events: Vec<DomainEvent>,
}

impl<'a, S: Store + ?Sized> Txn<'a, S> {
    /// Queue an event for publication after commit.
    pub fn publish(&mut self, event: DomainEvent) {
        self.events.push(event);
    }
}

/// Run `f` as a unit of work. On `Ok` the queued events are handed back
/// for publication; on `Err` they are dropped with the error.
pub fn with_txn<S, T, E>(
    store: &S,
    f: impl FnOnce(&mut Txn<'_, S>) -> Result<T, E>,
) -> Result<(T, Vec<DomainEvent>), E>
where
    S: Store + ?Sized,
{
    let mut txn = Txn { store, events: Vec::new() };
    let out = f(&mut txn)?;
    Ok((out, txn.events))
}

/// Concurrent in-memory store; the reference implementation of [`Store`].
#[derive(Default)]
pub struct InMemoryStore {
    uploads: DashMap<UploadId, UploadRecord>,
    upload_by_fp: DashMap<Fingerprint, UploadId>,
    certs: DashMap<CertificateId, CertificateRecord>,
    cert_by_fp: DashMap<Fingerprint, CertificateId>,
    crls: DashMap<CrlId, CrlRecord>,
    crl_by_fp: DashMap<Fingerprint, CrlId>,
    master_lists: DashMap<MasterListId, MasterListRecord>,
}

impl InMemoryStore {
    /// Fresh empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn insert_upload(&self, rec: UploadRecord) {
        self.upload_by_fp.insert(rec.content_fingerprint, rec.id);
        self.uploads.insert(rec.id, rec);
    }

    fn upload(&self, id: UploadId) -> Option<UploadRecord> {
        self.uploads.get(&id).map(|r| r.clone())
    }

    fn find_upload_by_fingerprint(&self, fp: &Fingerprint) -> Option<UploadRecord> {
        let id = *self.upload_by_fp.get(fp)?;
        let rec = self.uploads.get(&id)?.clone();
        (rec.status != UploadStatus::Failed).then_some(rec)
    }

    fn find_upload_by_file_name(&self, file_name: &str) -> Option<UploadRecord> {
        self.uploads
            .iter()
            .filter(|r| r.file_name == file_name)
            .max_by_key(|r| r.created_ms)
            .map(|r| r.clone())
    }

    fn update_upload(
        &self,
        id: UploadId,
        f: &mut dyn FnMut(&mut UploadRecord),
    ) -> Result<(), StoreError> {
        let mut rec = self.uploads.get_mut(&id).ok_or(StoreError::UploadNotFound(id))?;
        f(&mut rec);
        rec.updated_ms = pkd_core::ids::now_ms();
        Ok(())
    }

    fn advance_upload_status(&self, id: UploadId, to: UploadStatus) -> Result<(), StoreError> {
        let mut rec = self.uploads.get_mut(&id).ok_or(StoreError::UploadNotFound(id))?;
        if !rec.status.can_advance_to(to) {
            return Err(StoreError::IllegalTransition { from: rec.status, to });
        }
        rec.status = to;
        rec.updated_ms = pkd_core::ids::now_ms();
        Ok(())
    }

    fn upsert_certificate(&self, rec: CertificateRecord) -> UpsertOutcome<CertificateId> {
        match self.cert_by_fp.entry(rec.fingerprint_sha256) {
            dashmap::mapref::entry::Entry::Occupied(e) => UpsertOutcome::Skipped(*e.get()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let id = rec.id;
                e.insert(id);
                self.certs.insert(id, rec);
                UpsertOutcome::Inserted(id)
            }
        }
    }

    fn certificate(&self, id: CertificateId) -> Option<CertificateRecord> {
        self.certs.get(&id).map(|r| r.clone())
    }

    fn update_certificate(
        &self,
        id: CertificateId,
        f: &mut dyn FnMut(&mut CertificateRecord),
    ) -> Result<(), StoreError> {
        let mut rec = self.certs.get_mut(&id).ok_or(StoreError::CertificateNotFound(id))?;
        f(&mut rec);
        Ok(())
    }

    fn find_csca_by_subject(&self, subject_dn: &str) -> Option<CertificateRecord> {
        self.certs
            .iter()
            .find(|c| c.kind == CertKind::Csca && c.subject_dn == subject_dn)
            .map(|c| c.clone())
    }

    fn certificates_for_upload(&self, upload_id: UploadId) -> Vec<CertificateRecord> {
        let mut out: Vec<_> =
            self.certs.iter().filter(|c| c.upload_id == upload_id).map(|c| c.clone()).collect();
        out.sort_by_key(|c| c.created_ms);
        out
    }

    fn certificate_count(&self) -> usize {
        self.certs.len()
    }

    fn upsert_crl(&self, rec: CrlRecord) -> UpsertOutcome<CrlId> {
        match self.crl_by_fp.entry(rec.fingerprint_sha256) {
            dashmap::mapref::entry::Entry::Occupied(e) => UpsertOutcome::Skipped(*e.get()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let id = rec.id;
                e.insert(id);
                self.crls.insert(id, rec);
                UpsertOutcome::Inserted(id)
            }
        }
    }

    fn update_crl(&self, id: CrlId, f: &mut dyn FnMut(&mut CrlRecord)) -> Result<(), StoreError> {
        if let Some(mut rec) = self.crls.get_mut(&id) {
            f(&mut rec);
        }
        Ok(())
    }

    fn find_crls_by_issuer(&self, issuer_dn: &str) -> Vec<CrlRecord> {
        self.crls.iter().filter(|c| c.issuer_dn == issuer_dn).map(|c| c.clone()).collect()
    }

    fn crls_for_upload(&self, upload_id: UploadId) -> Vec<CrlRecord> {
        self.crls.iter().filter(|c| c.upload_id == upload_id).map(|c| c.clone()).collect()
    }

    fn insert_master_list(&self, rec: MasterListRecord) -> MasterListId {
        let id = rec.id;
        self.master_lists.insert(id, rec);
        id
    }

    fn update_master_list(
        &self,
        id: MasterListId,
        f: &mut dyn FnMut(&mut MasterListRecord),
    ) -> Result<(), StoreError> {
        if let Some(mut rec) = self.master_lists.get_mut(&id) {
            f(&mut rec);
        }
        Ok(())
    }

    fn master_list_for_upload(&self, upload_id: UploadId) -> Option<MasterListRecord> {
        self.master_lists.iter().find(|m| m.upload_id == upload_id).map(|m| m.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::{FileFormat, ProcessingMode};
    use std::collections::BTreeSet;

    fn upload(status: UploadStatus) -> UploadRecord {
        UploadRecord {
            id: UploadId::new(),
            file_name: "x.ldif".into(),
            byte_size: 3,
            content_fingerprint: Fingerprint::of(b"abc"),
            detected_format: FileFormat::Ldif,
            mode: ProcessingMode::Auto,
            manual_pause_step: None,
            status,
            parse_faults: Vec::new(),
            notes: BTreeSet::new(),
            failure_message: None,
            created_ms: pkd_core::ids::now_ms(),
            updated_ms: pkd_core::ids::now_ms(),
        }
    }

    fn cert(subject: &str, kind: CertKind, der: &[u8]) -> CertificateRecord {
        CertificateRecord {
            id: CertificateId::new(),
            upload_id: UploadId::new(),
            kind,
            source: pkd_core::SourceType::Ldif,
            subject_dn: subject.into(),
            issuer_dn: subject.into(),
            serial_hex: "01".into(),
            subject_country: Some("UT".into()),
            issuer_country: Some("UT".into()),
            not_before: 0,
            not_after: i64::MAX,
            fingerprint_sha256: Fingerprint::of(der),
            der: der.to_vec(),
            validation: pkd_core::ValidationStatus::Unvalidated,
            errors: BTreeSet::new(),
            uploaded_to_ldap: false,
            created_ms: pkd_core::ids::now_ms(),
        }
    }

    #[test]
    fn upload_fingerprint_is_unique_until_failed() {
        let store = InMemoryStore::new();
        let rec = upload(UploadStatus::Received);
        let fp = rec.content_fingerprint;
        let id = rec.id;
        store.insert_upload(rec);
        assert_eq!(store.find_upload_by_fingerprint(&fp).map(|r| r.id), Some(id));

        store
            .update_upload(id, &mut |r| {
                r.status = UploadStatus::Failed;
            })
            .unwrap();
        // Failed records no longer occupy the unique slot.
        assert!(store.find_upload_by_fingerprint(&fp).is_none());
    }

    #[test]
    fn cert_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let a = cert("CN=A,C=UT", CertKind::Csca, b"der-a");
        let first = store.upsert_certificate(a.clone());
        assert!(first.is_inserted());
        let again = store.upsert_certificate(cert("CN=A,C=UT", CertKind::Csca, b"der-a"));
        assert!(!again.is_inserted());
        assert_eq!(again.id(), first.id());
        assert_eq!(store.certificate_count(), 1);
    }

    #[test]
    fn csca_lookup_by_subject_only_matches_cscas() {
        let store = InMemoryStore::new();
        store.upsert_certificate(cert("CN=Root,C=UT", CertKind::Dsc, b"d1"));
        assert!(store.find_csca_by_subject("CN=Root,C=UT").is_none());
        store.upsert_certificate(cert("CN=Root,C=UT", CertKind::Csca, b"d2"));
        assert!(store.find_csca_by_subject("CN=Root,C=UT").is_some());
    }

    #[test]
    fn status_transitions_are_enforced() {
        let store = InMemoryStore::new();
        let rec = upload(UploadStatus::Received);
        let id = rec.id;
        store.insert_upload(rec);
        store.advance_upload_status(id, UploadStatus::Parsing).unwrap();
        let err = store.advance_upload_status(id, UploadStatus::Completed).unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[test]
    fn txn_events_survive_commit_only() {
        let store = InMemoryStore::new();
        let ok: Result<((), Vec<DomainEvent>), StoreError> = with_txn(&store, |txn| {
            txn.publish(DomainEvent::FileUploaded {
                upload_id: UploadId::new(),
                mode: ProcessingMode::Auto,
            });
            Ok(())
        });
        assert_eq!(ok.unwrap().1.len(), 1);

        let err: Result<((), Vec<DomainEvent>), StoreError> = with_txn(&store, |txn| {
            txn.publish(DomainEvent::FileUploaded {
                upload_id: UploadId::new(),
                mode: ProcessingMode::Auto,
            });
            Err(StoreError::UploadNotFound(UploadId::new()))
        });
        assert!(err.is_err()); // events dropped with the error
    }
}
