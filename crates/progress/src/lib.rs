//! Progress fan-out and logging initialization.
//!
//! A non-durable publish/subscribe keyed by upload id with SSE
//! semantics: subscribers are broadcast receivers, delivery is
//! best-effort, and an update with no subscriber anywhere is dropped on
//! the floor. Producers never block on consumers.

#![deny(unsafe_code)]

use dashmap::DashMap;
use pkd_core::{StageCounts, UploadId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Progress is emitted every this many items within a stage.
pub const PROGRESS_EVERY: usize = 10;

/// Stages reported over the progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStage {
    UploadCompleted,
    ParsingStarted,
    ParsingInProgress,
    ParsingCompleted,
    ValidationStarted,
    ValidationInProgress,
    ValidationCompleted,
    DbSavingStarted,
    DbSavingInProgress,
    DbSavingCompleted,
    LdapSavingStarted,
    LdapSavingInProgress,
    LdapSavingCompleted,
    Completed,
    Failed,
}

/// One progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub upload_id: UploadId,
    pub stage: ProgressStage,
    /// 0..=100 within the overall pipeline.
    pub percentage: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<StageCounts>,
    pub ts_ms: u64,
}

/// In-process fan-out of [`ProgressUpdate`]s.
pub struct ProgressBus {
    per_upload: DashMap<UploadId, broadcast::Sender<ProgressUpdate>>,
    all: broadcast::Sender<ProgressUpdate>,
}

/// Buffered updates per subscriber before lagging ones lose the oldest.
const CHANNEL_CAPACITY: usize = 256;

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    /// Fresh bus with no subscribers.
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { per_upload: DashMap::new(), all }
    }

    /// Subscribe to one upload's updates.
    pub fn subscribe(&self, upload_id: UploadId) -> broadcast::Receiver<ProgressUpdate> {
        self.per_upload
            .entry(upload_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to every upload's updates (the stream endpoint).
    pub fn subscribe_all(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.all.subscribe()
    }

    /// Send an update; silently dropped when nobody listens.
    pub fn send(&self, update: ProgressUpdate) {
        if let Some(tx) = self.per_upload.get(&update.upload_id) {
            let _ = tx.send(update.clone());
        }
        let _ = self.all.send(update);
    }

    /// Convenience constructor + send.
    pub fn emit(
        &self,
        upload_id: UploadId,
        stage: ProgressStage,
        percentage: u8,
        message: impl Into<String>,
        counts: Option<StageCounts>,
    ) {
        self.send(ProgressUpdate {
            upload_id,
            stage,
            percentage: percentage.min(100),
            message: message.into(),
            counts,
            ts_ms: pkd_core::ids::now_ms(),
        });
    }

    /// Drop the per-upload channel once an upload reaches a terminal
    /// stage; late subscribers to finished uploads get nothing.
    pub fn forget(&self, upload_id: UploadId) {
        self.per_upload.remove(&upload_id);
    }
}

/// Initialize structured logging (JSON) with env filter.
/// Set `RUST_LOG`, e.g. `info,pipeline=debug`.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
