//! Stage driver: wiring, gating, event handling.

use crate::parse::{self, ParseOutput};
use crate::upload::{self, UploadReceipt, UploadRequest};
use crate::validate::ValidationRun;
use crate::{PipelineConfig, PipelineError};
use dashmap::DashMap;
use directory::{
    certificate_entry, crl_entry, master_list_entry, BatchOutcome, DirEntry, Directory,
    DitConfig, Publisher,
};
use events::{EventBus, EventHandler, EventStream};
use pkd_core::value::{CertData, CrlData, MasterListEnvelope};
use pkd_core::{
    DomainEvent, FileFormat, PauseStep, ProcessingMode, SourceType, StageCounts, UploadId,
    UploadStatus,
};
use pki::anchors::TrustAnchors;
use progress::{ProgressBus, ProgressStage};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use store::{with_txn, Store};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Parse payload stashed while a MANUAL upload waits for the operator.
struct PendingValidation {
    certs: Vec<CertData>,
    crls: Vec<CrlData>,
    master_list: Option<MasterListEnvelope>,
}

struct Inner<S: Store, D: Directory> {
    store: Arc<S>,
    publisher: Publisher<D>,
    progress: ProgressBus,
    bus: EventBus,
    anchors: TrustAnchors,
    config: PipelineConfig,
    /// Stand-in for the external file storage collaborator.
    files: DashMap<UploadId, Arc<Vec<u8>>>,
    pending: DashMap<UploadId, PendingValidation>,
}

/// The pipeline facade: upload intake, stage execution, status.
pub struct PipelineService<S: Store, D: Directory> {
    inner: Arc<Inner<S, D>>,
}

impl<S: Store, D: Directory> Clone for PipelineService<S, D> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Snapshot answering "where is my upload".
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    pub mode: ProcessingMode,
    pub paused_at_step: Option<PauseStep>,
    pub certificates_total: usize,
    pub certificates_valid: usize,
    pub certificates_published: usize,
    pub crls_total: usize,
    pub parse_faults: usize,
    pub failure_message: Option<String>,
}

impl<S: Store, D: Directory> PipelineService<S, D> {
    /// Build the service; wire the returned stream with [`Self::start`].
    pub fn new(
        store: Arc<S>,
        dir: Arc<D>,
        dit: DitConfig,
        anchors: TrustAnchors,
        config: PipelineConfig,
    ) -> (Self, EventStream) {
        let (bus, stream) = EventBus::bounded(config.queue_capacity);
        let inner = Inner {
            store,
            publisher: Publisher::new(dir, dit),
            progress: ProgressBus::new(),
            bus,
            anchors,
            config,
            files: DashMap::new(),
            pending: DashMap::new(),
        };
        (Self { inner: Arc::new(inner) }, stream)
    }

    /// Spawn the event dispatcher for this service.
    pub fn start(&self, stream: EventStream) -> JoinHandle<()> {
        events::spawn_dispatcher(stream, Arc::new(self.clone()), self.inner.config.workers)
    }

    /// Progress subscriptions.
    pub fn progress(&self) -> &ProgressBus {
        &self.inner.progress
    }

    /// The underlying store (report surface).
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Accept a file; in AUTO mode the pipeline runs from here.
    #[instrument(skip_all, fields(file = %req.file_name))]
    pub async fn upload(&self, req: UploadRequest) -> Result<UploadReceipt, PipelineError> {
        let (receipt, events) = upload::accept(self.inner.store.as_ref(), &self.inner.config, &req)?;
        self.inner.files.insert(receipt.upload_id, Arc::new(req.bytes));
        self.inner.bus.publish_all(events).await?;
        Ok(receipt)
    }

    /// A stage body failed: record it and hand the error back. Gate
    /// violations never come through here; they leave the record as-is.
    async fn fail_on_err<T>(
        &self,
        upload_id: UploadId,
        stage: &'static str,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        if let Err(e) = &result {
            self.mark_failed(upload_id, stage, e.to_string()).await;
        }
        result
    }

    /// Parse stage. AUTO invokes it off the `FileUploaded` event; a
    /// MANUAL operator calls it explicitly.
    #[instrument(skip(self), fields(upload = %upload_id))]
    pub async fn run_parse(&self, upload_id: UploadId) -> Result<(), PipelineError> {
        let record = self
            .inner
            .store
            .upload(upload_id)
            .ok_or(store::StoreError::UploadNotFound(upload_id))?;
        if record.status != UploadStatus::Received {
            return Err(PipelineError::Gate(format!(
                "parse requires RECEIVED, found {:?}",
                record.status
            )));
        }
        let result = self.parse_inner(upload_id, &record).await;
        self.fail_on_err(upload_id, "parsing", result).await
    }

    async fn parse_inner(
        &self,
        upload_id: UploadId,
        record: &pkd_core::UploadRecord,
    ) -> Result<(), PipelineError> {
        self.inner.store.update_upload(upload_id, &mut |r| r.manual_pause_step = None)?;
        self.inner.store.advance_upload_status(upload_id, UploadStatus::Parsing)?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::ParsingStarted,
            5,
            "parsing started",
            None,
        );

        let bytes = self
            .inner
            .files
            .get(&upload_id)
            .map(|b| b.clone())
            .ok_or(PipelineError::MissingContent(upload_id))?;

        let mut output: ParseOutput = match record.detected_format {
            FileFormat::Ldif => {
                let progress_bus = &self.inner.progress;
                parse::parse_ldif(Cursor::new(bytes.as_slice()), |n, out| {
                    if n % progress::PROGRESS_EVERY == 0 {
                        progress_bus.emit(
                            upload_id,
                            ProgressStage::ParsingInProgress,
                            15,
                            format!(
                                "{} entries, {} certs, {} crls",
                                n,
                                out.certs.len(),
                                out.crls.len()
                            ),
                            None,
                        );
                    }
                })
            }
            FileFormat::MasterList => {
                parse::parse_master_list(bytes.as_slice(), &self.inner.anchors)?
            }
        };

        // Imported DNs lose their ICAO suffix in favour of our root.
        let dit = self.inner.publisher.dit();
        for dn in output
            .certs
            .iter_mut()
            .filter_map(|c| c.entry_dn.as_mut())
            .chain(output.crls.iter_mut().filter_map(|c| c.entry_dn.as_mut()))
        {
            *dn = dit.rewrite_source_dn(dn);
        }

        if !output.faults.is_empty() {
            let faults = output.faults.clone();
            self.inner
                .store
                .update_upload(upload_id, &mut |r| r.parse_faults.extend(faults.clone()))?;
        }
        if output.extracted() == 0 {
            return Err(PipelineError::ParseEmpty);
        }

        let mode = record.mode;
        let certs_n = output.certs.len();
        let ((), events) = with_txn(self.inner.store.as_ref(), |txn| {
            txn.publish(DomainEvent::ParsingCompleted {
                upload_id,
                mode,
                certs: output.certs,
                crls: output.crls,
                master_list: output.master_list,
            });
            Ok::<_, PipelineError>(())
        })?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::ParsingCompleted,
            30,
            format!("parsed {certs_n} certificates"),
            None,
        );
        self.inner.bus.publish_all(events).await?;
        Ok(())
    }

    /// Validation stage for a MANUAL upload paused after parsing.
    pub async fn run_validation(&self, upload_id: UploadId) -> Result<StageCounts, PipelineError> {
        let record = self
            .inner
            .store
            .upload(upload_id)
            .ok_or(store::StoreError::UploadNotFound(upload_id))?;
        if !record.paused_at(PauseStep::ParsingCompleted) {
            return Err(PipelineError::Gate(
                "validation requires a MANUAL upload paused at PARSING_COMPLETED".into(),
            ));
        }
        let (_, pending) = self
            .inner
            .pending
            .remove(&upload_id)
            .ok_or(PipelineError::MissingContent(upload_id))?;
        self.run_validation_with(upload_id, pending.certs, pending.crls, pending.master_list)
            .await
    }

    /// Core of the validation stage; AUTO passes the event payload in
    /// directly, MANUAL goes through the pending stash. Failures are
    /// recorded on the upload before they propagate.
    #[instrument(skip_all, fields(upload = %upload_id))]
    async fn run_validation_with(
        &self,
        upload_id: UploadId,
        certs: Vec<CertData>,
        crls: Vec<CrlData>,
        master_list: Option<MasterListEnvelope>,
    ) -> Result<StageCounts, PipelineError> {
        let record = self
            .inner
            .store
            .upload(upload_id)
            .ok_or(store::StoreError::UploadNotFound(upload_id))?;
        let mode = record.mode;
        let result = self.validation_inner(upload_id, mode, certs, crls, master_list).await;
        let counts = self.fail_on_err(upload_id, "validation", result).await?;

        match mode {
            ProcessingMode::Auto => {
                // Per-cert entries already went up batch-by-batch; the
                // tail publishes only the container-level material, so
                // no add is attempted twice within one run.
                let published = self.finish_publication(upload_id, false).await.map(|_| ());
                self.fail_on_err(upload_id, "publication", published).await?;
            }
            ProcessingMode::Manual => {
                self.inner.store.update_upload(upload_id, &mut |r| {
                    r.manual_pause_step = Some(PauseStep::ValidationCompleted);
                })?;
            }
        }
        Ok(counts)
    }

    async fn validation_inner(
        &self,
        upload_id: UploadId,
        mode: ProcessingMode,
        certs: Vec<CertData>,
        crls: Vec<CrlData>,
        master_list: Option<MasterListEnvelope>,
    ) -> Result<StageCounts, PipelineError> {
        self.inner.store.update_upload(upload_id, &mut |r| r.manual_pause_step = None)?;
        self.inner.store.advance_upload_status(upload_id, UploadStatus::Validating)?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::ValidationStarted,
            30,
            "validation started",
            None,
        );

        let publish_inline = mode == ProcessingMode::Auto;
        let run = ValidationRun::new(
            self.inner.store.as_ref(),
            &self.inner.publisher,
            &self.inner.progress,
            &self.inner.config,
            upload_id,
            publish_inline,
        );
        let output = run.run(certs, crls, master_list).await?;

        let notes = output.notes.clone();
        let faults = output.faults.clone();
        self.inner.store.update_upload(upload_id, &mut |r| {
            r.notes.extend(notes.iter().copied());
            r.parse_faults.extend(faults.clone());
        })?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::ValidationCompleted,
            90,
            format!("validated {} certificates", output.counts.certificates_total),
            Some(output.counts),
        );

        let counts = output.counts;
        let ((), events) = with_txn(self.inner.store.as_ref(), |txn| {
            txn.publish(DomainEvent::ValidationCompleted { upload_id, mode, counts });
            Ok::<_, PipelineError>(())
        })?;
        self.inner.bus.publish_all(events).await?;
        Ok(counts)
    }

    /// Publication stage for a MANUAL upload paused after validation.
    pub async fn run_publication(
        &self,
        upload_id: UploadId,
    ) -> Result<BatchOutcome, PipelineError> {
        let record = self
            .inner
            .store
            .upload(upload_id)
            .ok_or(store::StoreError::UploadNotFound(upload_id))?;
        if !record.paused_at(PauseStep::ValidationCompleted) {
            return Err(PipelineError::Gate(
                "publication requires a MANUAL upload paused at VALIDATION_COMPLETED".into(),
            ));
        }
        self.inner.store.update_upload(upload_id, &mut |r| r.manual_pause_step = None)?;
        let result = self.finish_publication(upload_id, true).await;
        self.fail_on_err(upload_id, "publication", result).await
    }

    /// Publish what the upload still owes the directory, then complete.
    /// With `sweep_rows` the per-certificate and CRL rows still marked
    /// unpublished go up too; this is the MANUAL publication stage, which
    /// doubles as the retry path for rows whose earlier adds failed.
    /// The AUTO tail passes `false`: its rows were published
    /// batch-by-batch during validation, and a row left unmarked there
    /// means a failed add that must wait for the next run.
    async fn finish_publication(
        &self,
        upload_id: UploadId,
        sweep_rows: bool,
    ) -> Result<BatchOutcome, PipelineError> {
        self.inner.store.advance_upload_status(upload_id, UploadStatus::Publishing)?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::LdapSavingStarted,
            90,
            "publishing to directory",
            None,
        );

        let dit = self.inner.publisher.dit().clone();
        let mut entries: Vec<(pkd_core::CertificateId, DirEntry)> = Vec::new();
        let mut crl_entries: Vec<(pkd_core::CrlId, DirEntry)> = Vec::new();
        if sweep_rows {
            for rec in self.inner.store.certificates_for_upload(upload_id) {
                if rec.uploaded_to_ldap || rec.source == SourceType::MasterList {
                    continue;
                }
                entries.push((rec.id, certificate_entry(&dit, &rec)));
            }
            for rec in self.inner.store.crls_for_upload(upload_id) {
                if !rec.uploaded_to_ldap {
                    crl_entries.push((rec.id, crl_entry(&dit, &rec)));
                }
            }
        }
        let master_list = self.inner.store.master_list_for_upload(upload_id);

        let cert_entries: Vec<DirEntry> = entries.iter().map(|(_, e)| e.clone()).collect();
        let mut outcome = self.inner.publisher.add_batch(&cert_entries).await;
        let failed: std::collections::HashSet<String> =
            outcome.failed.iter().map(|(dn, _)| dn.clone()).collect();
        for (id, entry) in &entries {
            if !failed.contains(&entry.dn) {
                self.inner.store.update_certificate(*id, &mut |r| r.uploaded_to_ldap = true)?;
            }
        }
        for (id, entry) in &crl_entries {
            match self.inner.publisher.add(entry).await {
                Ok(directory::AddOutcome::Added) => {
                    outcome.added += 1;
                    self.inner.store.update_crl(*id, &mut |r| r.uploaded_to_ldap = true)?;
                }
                Ok(directory::AddOutcome::DuplicateSkipped) => {
                    outcome.duplicate_skipped += 1;
                    self.inner.store.update_crl(*id, &mut |r| r.uploaded_to_ldap = true)?;
                }
                Err(e) => outcome.failed.push((entry.dn.clone(), e.to_string())),
            }
        }
        if let Some(ml) = master_list.filter(|m| !m.uploaded_to_ldap) {
            let entry = master_list_entry(&dit, &ml);
            match self.inner.publisher.add(&entry).await {
                Ok(directory::AddOutcome::Added) => {
                    outcome.added += 1;
                    self.inner
                        .store
                        .update_master_list(ml.id, &mut |r| r.uploaded_to_ldap = true)?;
                }
                Ok(directory::AddOutcome::DuplicateSkipped) => {
                    outcome.duplicate_skipped += 1;
                    self.inner
                        .store
                        .update_master_list(ml.id, &mut |r| r.uploaded_to_ldap = true)?;
                }
                Err(e) => outcome.failed.push((entry.dn.clone(), e.to_string())),
            }
        }

        self.inner.store.advance_upload_status(upload_id, UploadStatus::Completed)?;
        self.inner.progress.emit(
            upload_id,
            ProgressStage::Completed,
            100,
            "completed",
            None,
        );
        self.inner.progress.forget(upload_id);
        self.inner.files.remove(&upload_id);
        info!(added = outcome.added, skipped = outcome.duplicate_skipped, "publication finished");
        Ok(outcome)
    }

    /// Current state of an upload, with row counts from the store.
    pub fn status(&self, upload_id: UploadId) -> Option<StatusView> {
        let record = self.inner.store.upload(upload_id)?;
        let certs = self.inner.store.certificates_for_upload(upload_id);
        Some(StatusView {
            upload_id,
            status: record.status,
            mode: record.mode,
            paused_at_step: record.manual_pause_step,
            certificates_total: certs.len(),
            certificates_valid: certs
                .iter()
                .filter(|c| c.validation == pkd_core::ValidationStatus::Valid)
                .count(),
            certificates_published: certs.iter().filter(|c| c.uploaded_to_ldap).count(),
            crls_total: self.inner.store.crls_for_upload(upload_id).len(),
            parse_faults: record.parse_faults.len(),
            failure_message: record.failure_message,
        })
    }

    /// Terminal failure: record the stage and message, emit progress.
    async fn mark_failed(&self, upload_id: UploadId, stage: &'static str, message: String) {
        error!(upload = %upload_id, stage, %message, "stage failed");
        match self.inner.store.advance_upload_status(upload_id, UploadStatus::Failed) {
            Ok(()) => {
                let noted = self.inner.store.update_upload(upload_id, &mut |r| {
                    r.failure_message = Some(format!("{stage}: {message}"));
                });
                if let Err(e) = noted {
                    error!(upload = %upload_id, error = %e, "could not record failure");
                }
            }
            // Already terminal; nothing further to record.
            Err(e) => warn!(upload = %upload_id, error = %e, "failure after terminal state"),
        }
        self.inner.progress.emit(
            upload_id,
            ProgressStage::Failed,
            100,
            format!("{stage} failed: {message}"),
            None,
        );
        self.inner.progress.forget(upload_id);
        let _ = self
            .inner
            .bus
            .publish(DomainEvent::UploadFailed { upload_id, stage, message })
            .await;
    }
}

impl<S: Store, D: Directory> EventHandler for PipelineService<S, D> {
    async fn handle(&self, event: DomainEvent) {
        match event {
            DomainEvent::FileUploaded { upload_id, mode: ProcessingMode::Auto } => {
                // Failures are recorded on the record by the stage itself.
                let _ = self.run_parse(upload_id).await;
            }
            DomainEvent::FileUploaded { upload_id, mode: ProcessingMode::Manual } => {
                let paused = self.inner.store.update_upload(upload_id, &mut |r| {
                    r.manual_pause_step = Some(PauseStep::UploadCompleted);
                });
                if let Err(e) = paused {
                    self.mark_failed(upload_id, "upload", e.to_string()).await;
                    return;
                }
                self.inner.progress.emit(
                    upload_id,
                    ProgressStage::UploadCompleted,
                    5,
                    "uploaded; waiting for parse trigger",
                    None,
                );
            }
            DomainEvent::ParsingCompleted {
                upload_id,
                mode: ProcessingMode::Auto,
                certs,
                crls,
                master_list,
            } => {
                let _ = self.run_validation_with(upload_id, certs, crls, master_list).await;
            }
            DomainEvent::ParsingCompleted {
                upload_id,
                mode: ProcessingMode::Manual,
                certs,
                crls,
                master_list,
            } => {
                self.inner
                    .pending
                    .insert(upload_id, PendingValidation { certs, crls, master_list });
                let paused = self.inner.store.update_upload(upload_id, &mut |r| {
                    r.manual_pause_step = Some(PauseStep::ParsingCompleted);
                });
                if let Err(e) = paused {
                    self.mark_failed(upload_id, "parsing", e.to_string()).await;
                }
            }
            DomainEvent::ValidationCompleted { upload_id, counts, .. } => {
                info!(
                    upload = %upload_id,
                    total = counts.certificates_total,
                    valid = counts.certificates_valid,
                    "validation completed"
                );
            }
            DomainEvent::UploadFailed { upload_id, stage, .. } => {
                warn!(upload = %upload_id, stage, "upload failed");
            }
        }
    }
}
