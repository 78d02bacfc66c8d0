//! Validation stage: two passes with interleaved DB/LDAP batching.
//!
//! Pass 1 settles the CSCAs so pass 2 can chain DSCs against stored
//! rows. Every batch commits to the store first, then goes to the LDAP
//! batch uploader, then a short follow-up marks the published rows.
//! One deterministic sequence: there is no separate async publication
//! handler to race against, and peak memory is one batch.

use crate::{PipelineConfig, PipelineError};
use directory::{certificate_entry, crl_entry, DirEntry, Directory, Publisher};
use pkd_core::value::{CertData, CrlData, MasterListEnvelope};
use pkd_core::{
    CertKind, CertificateId, CertificateRecord, CrlId, CrlRecord, Fingerprint, MasterListRecord,
    ParseFault, SourceType, StageCounts, UploadId, ValidationErrorKind, ValidationStatus,
};
use pki::cert::ParsedCert;
use pki::crl::ParsedCrl;
use pki::verify;
use progress::{ProgressBus, ProgressStage, PROGRESS_EVERY};
use std::collections::{BTreeSet, HashSet};
use store::{with_txn, Store, UpsertOutcome};
use tracing::{debug, info, instrument, warn};

/// Validation output handed back to the stage driver.
#[derive(Debug)]
pub struct ValidationOutput {
    pub counts: StageCounts,
    /// Upload-level notes (untrusted master list signer).
    pub notes: BTreeSet<ValidationErrorKind>,
    /// Items that would not even decode.
    pub faults: Vec<ParseFault>,
}

/// One validation run over an upload's extracted items.
pub(crate) struct ValidationRun<'a, S: Store, D: Directory> {
    pub store: &'a S,
    pub publisher: &'a Publisher<D>,
    pub progress: &'a ProgressBus,
    pub config: &'a PipelineConfig,
    pub upload_id: UploadId,
    /// AUTO interleaves LDAP batches; MANUAL defers them to the
    /// explicit publication stage.
    pub publish_inline: bool,
    pub counts: StageCounts,
    pub notes: BTreeSet<ValidationErrorKind>,
    pub faults: Vec<ParseFault>,
    total_items: usize,
    processed: usize,
}

impl<'a, S: Store, D: Directory> ValidationRun<'a, S, D> {
    pub fn new(
        store: &'a S,
        publisher: &'a Publisher<D>,
        progress: &'a ProgressBus,
        config: &'a PipelineConfig,
        upload_id: UploadId,
        publish_inline: bool,
    ) -> Self {
        Self {
            store,
            publisher,
            progress,
            config,
            upload_id,
            publish_inline,
            counts: StageCounts::default(),
            notes: BTreeSet::new(),
            faults: Vec::new(),
            total_items: 0,
            processed: 0,
        }
    }

    /// Drive both passes plus CRLs and the master list envelope.
    #[instrument(skip_all, fields(upload = %self.upload_id))]
    pub async fn run(
        mut self,
        certs: Vec<CertData>,
        crls: Vec<CrlData>,
        master_list: Option<MasterListEnvelope>,
    ) -> Result<ValidationOutput, PipelineError> {
        self.total_items = certs.len() + crls.len();
        let now = pkd_core::ids::now_secs();

        // CRLs decode up front: pass 2 consults them for revocation
        // before their rows are persisted.
        let mut crl_pool = Vec::new();
        for (i, crl) in crls.iter().enumerate() {
            match ParsedCrl::decode(&crl.der) {
                Ok(parsed) => crl_pool.push(parsed),
                Err(e) => {
                    self.faults.push(ParseFault { index: i, reason: format!("crl: {e}") })
                }
            }
        }

        let (cscas, dscs): (Vec<_>, Vec<_>) =
            certs.into_iter().partition(|c| c.kind == CertKind::Csca);

        self.pass_cscas(cscas, now).await?;
        self.pass_dscs(dscs, &crl_pool, now).await?;
        self.persist_crls(crl_pool).await?;
        if let Some(envelope) = master_list {
            self.persist_master_list(envelope)?;
        }

        info!(
            total = self.counts.certificates_total,
            valid = self.counts.certificates_valid,
            published = self.counts.published,
            "validation finished"
        );
        Ok(ValidationOutput { counts: self.counts, notes: self.notes, faults: self.faults })
    }

    async fn pass_cscas(&mut self, items: Vec<CertData>, now: i64) -> Result<(), PipelineError> {
        let mut batch = Vec::new();
        for (i, data) in items.into_iter().enumerate() {
            match self.validate_csca(&data, now) {
                Some(rec) => batch.push(rec),
                None => self.faults.push(ParseFault {
                    index: i,
                    reason: "certificate would not decode".into(),
                }),
            }
            if batch.len() >= self.config.batch_size {
                self.flush_batch(std::mem::take(&mut batch)).await?;
            }
            self.step();
        }
        if !batch.is_empty() {
            self.flush_batch(batch).await?;
        }
        Ok(())
    }

    async fn pass_dscs(
        &mut self,
        items: Vec<CertData>,
        crl_pool: &[ParsedCrl],
        now: i64,
    ) -> Result<(), PipelineError> {
        let mut batch = Vec::new();
        for (i, data) in items.into_iter().enumerate() {
            match self.validate_dsc(&data, crl_pool, now) {
                Some(rec) => batch.push(rec),
                None => self.faults.push(ParseFault {
                    index: i,
                    reason: "certificate would not decode".into(),
                }),
            }
            if batch.len() >= self.config.batch_size {
                self.flush_batch(std::mem::take(&mut batch)).await?;
            }
            self.step();
        }
        if !batch.is_empty() {
            self.flush_batch(batch).await?;
        }
        Ok(())
    }

    fn validate_csca(&mut self, data: &CertData, now: i64) -> Option<CertificateRecord> {
        let parsed = match ParsedCert::decode(&data.der) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "undecodable csca");
                return None;
            }
        };
        let mut errors = BTreeSet::new();
        if !(parsed.has_basic_constraints && parsed.is_ca && parsed.has_key_cert_sign) {
            errors.insert(ValidationErrorKind::InvalidCaConstraints);
        }
        let expired = !parsed.valid_at(now);
        if expired {
            errors.insert(ValidationErrorKind::Expired);
        } else if verify::verify_self_signed(&parsed).is_err() {
            // Known interop: some national CSCAs fail self-verify on
            // signature-encoding quirks. Recorded, still persisted.
            errors.insert(ValidationErrorKind::SelfSignFailed);
        }
        Some(self.build_record(data, &parsed, errors, expired))
    }

    fn validate_dsc(
        &mut self,
        data: &CertData,
        crl_pool: &[ParsedCrl],
        now: i64,
    ) -> Option<CertificateRecord> {
        let parsed = match ParsedCert::decode(&data.der) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "undecodable dsc");
                return None;
            }
        };
        let mut errors = BTreeSet::new();
        let issuer_row = self.store.find_csca_by_subject(&parsed.issuer_dn);
        let mut signature_ok = false;
        match &issuer_row {
            None => {
                errors.insert(ValidationErrorKind::IssuerNotFound);
            }
            Some(csca_row) => match ParsedCert::decode(&csca_row.der) {
                Ok(csca) if verify::verify_issued_by(&parsed, &csca).is_ok() => {
                    signature_ok = true;
                }
                _ => {
                    errors.insert(ValidationErrorKind::SignatureInvalid);
                }
            },
        }
        let expired = !parsed.valid_at(now);
        if expired {
            errors.insert(ValidationErrorKind::Expired);
        }
        if !parsed.has_digital_signature {
            errors.insert(ValidationErrorKind::InvalidKeyUsage);
        }
        if let Some(csca_row) = &issuer_row {
            let stored: Vec<ParsedCrl> = self
                .store
                .find_crls_by_issuer(&csca_row.subject_dn)
                .iter()
                .filter_map(|row| ParsedCrl::decode(&row.der).ok())
                .collect();
            let revoked = crl_pool
                .iter()
                .chain(stored.iter())
                .filter(|crl| crl.issuer_dn == csca_row.subject_dn && crl.current_at(now))
                .any(|crl| crl.revokes(&parsed.serial_hex));
            if revoked {
                errors.insert(ValidationErrorKind::Revoked);
            }
        }
        // Non-conformant DSCs with a good signature trade their
        // structural complaints for the dedicated marker.
        if data.kind == CertKind::DscNc
            && signature_ok
            && errors.contains(&ValidationErrorKind::InvalidKeyUsage)
        {
            errors.remove(&ValidationErrorKind::InvalidKeyUsage);
            errors.insert(ValidationErrorKind::NonConformantAttr);
        }
        Some(self.build_record(data, &parsed, errors, expired))
    }

    fn build_record(
        &self,
        data: &CertData,
        parsed: &ParsedCert,
        errors: BTreeSet<ValidationErrorKind>,
        expired: bool,
    ) -> CertificateRecord {
        let validation = if expired {
            ValidationStatus::Expired
        } else if errors.is_empty() {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        };
        CertificateRecord {
            id: CertificateId::new(),
            upload_id: self.upload_id,
            kind: data.kind,
            source: data.source,
            subject_dn: parsed.subject_dn.clone(),
            issuer_dn: parsed.issuer_dn.clone(),
            serial_hex: parsed.serial_hex.clone(),
            subject_country: parsed.subject_country.clone(),
            issuer_country: parsed.issuer_country.clone(),
            not_before: parsed.not_before,
            not_after: parsed.not_after,
            fingerprint_sha256: data.fingerprint(),
            der: data.der.clone(),
            validation,
            errors,
            uploaded_to_ldap: false,
            created_ms: pkd_core::ids::now_ms(),
        }
    }

    /// The per-batch protocol: persist, publish, mark, report.
    async fn flush_batch(
        &mut self,
        batch: Vec<CertificateRecord>,
    ) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.progress.emit(
            self.upload_id,
            ProgressStage::DbSavingInProgress,
            self.stage_pct(),
            format!("saving batch of {}", batch.len()),
            Some(self.counts),
        );

        // Transaction A: upsert rows, idempotent on fingerprint.
        let (persisted, _) = with_txn(self.store, |txn| {
            let mut persisted: Vec<(CertificateId, CertificateRecord)> = Vec::new();
            for rec in batch {
                let outcome = txn.store.upsert_certificate(rec.clone());
                if let UpsertOutcome::Inserted(_) = outcome {
                    self.counts.certificates_total += 1;
                    match rec.validation {
                        ValidationStatus::Valid => self.counts.certificates_valid += 1,
                        _ => self.counts.certificates_invalid += 1,
                    }
                }
                persisted.push((outcome.id(), rec));
            }
            Ok::<_, PipelineError>(persisted)
        })?;

        if !self.publish_inline {
            return Ok(());
        }

        // Master-list-sourced rows never publish individually; the
        // signed container goes up instead.
        let to_publish: Vec<(CertificateId, DirEntry)> = persisted
            .iter()
            .filter(|(_, rec)| rec.source != SourceType::MasterList)
            .map(|(id, rec)| (*id, certificate_entry(self.publisher.dit(), rec)))
            .collect();
        if to_publish.is_empty() {
            return Ok(());
        }

        let entries: Vec<DirEntry> = to_publish.iter().map(|(_, e)| e.clone()).collect();
        let outcome = self.publisher.add_batch(&entries).await;
        self.counts.published += outcome.added;
        self.counts.duplicates_skipped += outcome.duplicate_skipped;
        self.counts.publish_failures += outcome.failed.len();
        if !outcome.failed.is_empty() {
            // Rows stay unmarked and retry on the next run.
            warn!(failed = outcome.failed.len(), "ldap batch had failures");
        }

        // Follow-up transaction: mark what made it up.
        let failed_dns: HashSet<&str> =
            outcome.failed.iter().map(|(dn, _)| dn.as_str()).collect();
        let ((), _) = with_txn(self.store, |txn| {
            for (id, entry) in &to_publish {
                if !failed_dns.contains(entry.dn.as_str()) {
                    txn.store.update_certificate(*id, &mut |rec| {
                        rec.uploaded_to_ldap = true;
                    })?;
                }
            }
            Ok::<_, PipelineError>(())
        })?;

        self.progress.emit(
            self.upload_id,
            ProgressStage::LdapSavingInProgress,
            self.stage_pct(),
            format!("published {} entries", outcome.succeeded()),
            Some(self.counts),
        );
        Ok(())
    }

    async fn persist_crls(&mut self, crl_pool: Vec<ParsedCrl>) -> Result<(), PipelineError> {
        for parsed in crl_pool {
            let rec = CrlRecord {
                id: CrlId::new(),
                upload_id: self.upload_id,
                issuer_dn: parsed.issuer_dn.clone(),
                issuer_country: parsed.issuer_country.clone(),
                this_update: parsed.this_update,
                next_update: parsed.next_update,
                revoked_count: parsed.revoked_count(),
                fingerprint_sha256: Fingerprint::of(&parsed.der),
                der: parsed.der.clone(),
                uploaded_to_ldap: false,
                created_ms: pkd_core::ids::now_ms(),
            };
            let (outcome, _) = with_txn(self.store, |txn| {
                Ok::<_, PipelineError>(txn.store.upsert_crl(rec.clone()))
            })?;
            if outcome.is_inserted() {
                self.counts.crls_total += 1;
            }
            if self.publish_inline {
                let entry = crl_entry(self.publisher.dit(), &rec);
                match self.publisher.add(&entry).await {
                    Ok(directory::AddOutcome::Added) => {
                        self.counts.published += 1;
                        self.store.update_crl(outcome.id(), &mut |r| r.uploaded_to_ldap = true)?;
                    }
                    Ok(directory::AddOutcome::DuplicateSkipped) => {
                        self.counts.duplicates_skipped += 1;
                        self.store.update_crl(outcome.id(), &mut |r| r.uploaded_to_ldap = true)?;
                    }
                    Err(e) => {
                        warn!(error = %e, "crl publish failed");
                        self.counts.publish_failures += 1;
                    }
                }
            }
            self.step();
        }
        Ok(())
    }

    fn persist_master_list(
        &mut self,
        envelope: MasterListEnvelope,
    ) -> Result<(), PipelineError> {
        if envelope.untrusted_signer {
            self.notes.insert(ValidationErrorKind::MasterListUntrustedSigner);
        }
        let rec = MasterListRecord {
            id: pkd_core::MasterListId::new(),
            upload_id: self.upload_id,
            signer_country: envelope.signer_country,
            contained_csca_count: envelope.contained_csca_count,
            raw_cms: envelope.raw_cms,
            uploaded_to_ldap: false,
            created_ms: pkd_core::ids::now_ms(),
        };
        let ((), _) = with_txn(self.store, |txn| {
            txn.store.insert_master_list(rec);
            Ok::<_, PipelineError>(())
        })?;
        Ok(())
    }

    fn step(&mut self) {
        self.processed += 1;
        if self.processed % PROGRESS_EVERY == 0 {
            self.progress.emit(
                self.upload_id,
                ProgressStage::ValidationInProgress,
                self.stage_pct(),
                format!("{}/{} items", self.processed, self.total_items),
                Some(self.counts),
            );
        }
    }

    /// Validation occupies 30..=90 of the pipeline percentage span.
    fn stage_pct(&self) -> u8 {
        if self.total_items == 0 {
            return 90;
        }
        let span = 60 * self.processed / self.total_items;
        (30 + span).min(90) as u8
    }
}
